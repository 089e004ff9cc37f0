//! Deterministic sample rows for the bundled movie-rental schema.
//!
//! The data follows the shape of the Sakila sample database: six languages,
//! sixteen categories with their usual ids, 200 actors and 1000 films. Casts
//! are generated so that exactly [HORROR_ACTORS] distinct actors play in
//! `Horror` films.

use tracing::info;

use crate::error::Result;
use crate::executor::Executor;
use crate::query::insert_into;
use crate::tables::{actor, category, film, film_actor, film_category, language};
use crate::value::Value;

pub const LANGUAGES: [&str; 6] = ["English", "Italian", "Japanese", "Mandarin", "French", "German"];

pub const CATEGORIES: [&str; 16] = [
    "Action",
    "Animation",
    "Children",
    "Classics",
    "Comedy",
    "Documentary",
    "Drama",
    "Family",
    "Foreign",
    "Games",
    "Horror",
    "Music",
    "New",
    "Sci-Fi",
    "Sports",
    "Travel",
];

pub const HORROR_CATEGORY_ID: i32 = 11;
pub const ACTOR_COUNT: i32 = 200;
pub const FILM_COUNT: i32 = 1000;
pub const HORROR_ACTORS: usize = 155;

const FIRST_NAMES: [&str; 20] = [
    "PENELOPE", "NICK", "ED", "JENNIFER", "JOHNNY", "BETTE", "GRACE", "MATTHEW", "JOE", "CHRISTIAN", "ZERO",
    "KARL", "UMA", "VIVIEN", "CUBA", "FRED", "HELEN", "DAN", "BOB", "LUCILLE",
];

const LAST_NAMES: [&str; 10] = [
    "GUINESS", "WAHLBERG", "CHASE", "DAVIS", "LOLLOBRIGIDA", "NICHOLSON", "MOSTEL", "JOHANSSON", "SWANK", "GABLE",
];

const TITLE_FIRST: [&str; 40] = [
    "ACADEMY", "ACE", "ADAPTATION", "AFFAIR", "AFRICAN", "AGENT", "AIRPLANE", "AIRPORT", "ALABAMA", "ALADDIN",
    "ALAMO", "ALASKA", "ALI", "ALICE", "ALIEN", "ALLEY", "ALONE", "ALTER", "AMADEUS", "AMELIE", "AMERICAN",
    "AMISTAD", "ANACONDA", "ANALYZE", "ANGELS", "ANNIE", "ANONYMOUS", "ANTHEM", "ANTITRUST", "ANYTHING",
    "APACHE", "APOCALYPSE", "APOLLO", "ARABIA", "ARACHNOPHOBIA", "ARGONAUTS", "ARIZONA", "ARK", "ARMAGEDDON",
    "ARMY",
];

const TITLE_SECOND: [&str; 25] = [
    "DINOSAUR", "GOLDFINGER", "HOLES", "PREJUDICE", "EGG", "TRUMAN", "SIERRA", "POLLOCK", "DEVIL", "CALENDAR",
    "HANOVER", "PHANTOM", "FANTASIA", "BROTHERHOOD", "GRAFFITI", "PANIC", "TRIP", "DESTINY", "CONFESSIONS",
    "HUNCHBACK", "ROCKETEER", "CRAZY", "GIRL", "TEEN", "ROOF",
];

const CHUNK_SIZE: usize = 500;

pub fn actor_name(actor_id: i32) -> (&'static str, &'static str) {
    let i = (actor_id - 1) as usize;
    (FIRST_NAMES[i % FIRST_NAMES.len()], LAST_NAMES[i / FIRST_NAMES.len()])
}

pub fn film_title(film_id: i32) -> String {
    let i = (film_id - 1) as usize;
    format!("{} {}", TITLE_FIRST[i % TITLE_FIRST.len()], TITLE_SECOND[i / TITLE_FIRST.len()])
}

pub fn film_category_id(film_id: i32) -> i32 {
    (film_id - 1) % CATEGORIES.len() as i32 + 1
}

/// Actors playing in a film, in billing order.
pub fn film_cast(film_id: i32) -> Vec<i32> {
    if film_category_id(film_id) == HORROR_CATEGORY_ID {
        // horror films share the first HORROR_ACTORS actors, three per film
        let h = (film_id - HORROR_CATEGORY_ID) / CATEGORIES.len() as i32;
        (0..3).map(|j| (h * 3 + j) % HORROR_ACTORS as i32 + 1).collect()
    } else {
        (0..=film_id % 5).map(|j| (film_id * 13 + j * 41) % ACTOR_COUNT + 1).collect()
    }
}

/// Inserts the sample rows. Expects empty tables.
pub fn populate<E: Executor + ?Sized>(executor: &mut E) -> Result<()> {
    let l = language();
    executor.insert(
        &insert_into(&l)
            .columns((&l.language_id, &l.name))
            .rows(LANGUAGES.iter().zip(1_i32..).map(|(name, id)| (id, *name))),
    )?;

    let a = actor();
    let actors = insert_into(&a)
        .columns((&a.actor_id, &a.first_name, &a.last_name))
        .rows((1..=ACTOR_COUNT).map(|id| {
            let (first, last) = actor_name(id);
            (id, first, last)
        }));
    executor.insert(&actors)?;

    let f = film();
    let films = insert_into(&f).columns((
        &f.film_id,
        &f.title,
        &f.description,
        &f.release_year,
        &f.language_id,
        &f.original_language_id,
        &f.length,
        &f.rental_rate,
    ));
    let ids: Vec<i32> = (1..=FILM_COUNT).collect();
    for chunk in ids.chunks(CHUNK_SIZE) {
        executor.insert(&films.rows(chunk.iter().map(|&id| film_row(id))))?;
    }

    let c = category();
    executor.insert(
        &insert_into(&c)
            .columns((&c.category_id, &c.name))
            .rows(CATEGORIES.iter().zip(1_i32..).map(|(name, id)| (id, *name))),
    )?;

    let fa = film_actor();
    let cast: Vec<(i16, i16)> = ids
        .iter()
        .flat_map(|&film_id| film_cast(film_id).into_iter().map(move |actor_id| (actor_id as i16, film_id as i16)))
        .collect();
    let film_actors = insert_into(&fa).columns((&fa.actor_id, &fa.film_id));
    for chunk in cast.chunks(CHUNK_SIZE) {
        executor.insert(&film_actors.rows(chunk.iter().copied()))?;
    }

    let fc = film_category();
    let film_categories = insert_into(&fc).columns((&fc.film_id, &fc.category_id));
    for chunk in ids.chunks(CHUNK_SIZE) {
        executor.insert(
            &film_categories.rows(chunk.iter().map(|&id| (id as i16, film_category_id(id) as i16))),
        )?;
    }

    info!(
        actors = ACTOR_COUNT,
        films = FILM_COUNT,
        roles = cast.len(),
        "sample data loaded"
    );
    Ok(())
}

fn film_row(id: i32) -> [Value; 8] {
    let original_language = (id % 10 == 0).then(|| ((id / 10) % 5 + 2) as i16);
    [
        Value::from(id),
        Value::from(film_title(id)),
        Value::from(format!("A story numbered {id} in the catalogue")),
        Value::from(2006),
        Value::from(1_i16),
        Value::from(original_language),
        Value::from(((id * 7) % 140 + 46) as i16),
        Value::from([0.99, 2.99, 4.99][(id % 3) as usize]),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(actor_name(1), ("PENELOPE", "GUINESS"));
        assert_eq!(film_title(1), "ACADEMY DINOSAUR");

        let actors: HashSet<_> = (1..=ACTOR_COUNT).map(actor_name).collect();
        assert_eq!(actors.len(), ACTOR_COUNT as usize);
        let titles: HashSet<_> = (1..=FILM_COUNT).map(film_title).collect();
        assert_eq!(titles.len(), FILM_COUNT as usize);
    }

    #[test]
    fn test_horror_cast() {
        let horror: HashSet<i32> = (1..=FILM_COUNT)
            .filter(|&id| film_category_id(id) == HORROR_CATEGORY_ID)
            .flat_map(film_cast)
            .collect();

        assert_eq!(horror.len(), HORROR_ACTORS);
    }

    #[test]
    fn test_casts_have_no_duplicates() {
        for id in 1..=FILM_COUNT {
            let cast = film_cast(id);
            let distinct: HashSet<_> = cast.iter().collect();
            assert_eq!(distinct.len(), cast.len(), "film {id}");
            assert!(cast.iter().all(|a| (1..=ACTOR_COUNT).contains(a)));
        }
    }
}
