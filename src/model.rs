//! Application records the demo queries are mapped into.

use crate::error::ShapeMismatch;
use crate::record::{FromRow, Record};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorName {
    pub first_name: String,
    pub last_name: String,
}

impl FromRow for ActorName {
    fn from_row(record: Record) -> Result<Self, ShapeMismatch> {
        let (first_name, last_name): (String, String) = record.into_row()?;
        Ok(Self { first_name, last_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmName {
    pub name: String,
}

impl FromRow for FilmName {
    fn from_row(record: Record) -> Result<Self, ShapeMismatch> {
        let (name,): (String,) = record.into_row()?;
        Ok(Self { name })
    }
}

/// An actor with the titles of the films they play in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorWithFilms {
    pub first_name: String,
    pub last_name: String,
    pub films: Vec<FilmName>,
}

impl FromRow for ActorWithFilms {
    fn from_row(record: Record) -> Result<Self, ShapeMismatch> {
        let (first_name, last_name, films): (String, String, Vec<FilmName>) = record.into_row()?;
        Ok(Self {
            first_name,
            last_name,
            films,
        })
    }
}
