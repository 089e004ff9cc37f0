//! Typed tables of the bundled movie-rental schema.
//!
//! ```
//! use filmdb::tables::film_actor;
//!
//! let fa = film_actor();
//! assert_eq!(fa.actor().first_name.table().reference(), "film_actor__actor");
//! ```

use crate::field::{Field, TableRef, TypedTable};

macro_rules! typed_table {
    ($(#[$meta:meta])* $ty:ident, $constructor:ident, $name:literal { $($field:ident: $rust:ty),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            table: TableRef,
            $(pub $field: Field<$rust>,)+
        }

        impl $ty {
            pub const NAME: &'static str = $name;

            /// The table at an arbitrary reference: an alias or a relationship path.
            pub fn at(table: TableRef) -> Self {
                Self {
                    $($field: Field::new(table.clone(), stringify!($field)),)+
                    table,
                }
            }

            pub fn new() -> Self {
                Self::at(TableRef::new($name))
            }

            /// The same table under another name, for self joins.
            pub fn aliased(alias: &str) -> Self {
                Self::at(TableRef::aliased($name, alias))
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl TypedTable for $ty {
            fn table_ref(&self) -> &TableRef {
                &self.table
            }
        }

        pub fn $constructor() -> $ty {
            $ty::new()
        }
    };
}

typed_table!(
    Language, language, "language" {
        language_id: i32,
        name: String,
    }
);

typed_table!(
    Actor, actor, "actor" {
        actor_id: i32,
        first_name: String,
        last_name: String,
    }
);

typed_table!(
    Film, film, "film" {
        film_id: i32,
        title: String,
        description: String,
        release_year: i32,
        language_id: i16,
        original_language_id: i16,
        length: i16,
        rental_rate: f64,
    }
);

typed_table!(
    Category, category, "category" {
        category_id: i32,
        name: String,
    }
);

typed_table!(
    /// Link between films and the actors playing in them.
    FilmActor, film_actor, "film_actor" {
        actor_id: i16,
        film_id: i16,
    }
);

typed_table!(
    /// Link between films and their categories.
    FilmCategory, film_category, "film_category" {
        film_id: i16,
        category_id: i16,
    }
);

impl Film {
    /// Film has two relationships to language, so the path names the one it follows.
    pub fn language(&self) -> Language {
        Language::at(self.table.via("language", Language::NAME))
    }

    pub fn original_language(&self) -> Language {
        Language::at(self.table.via("original_language", Language::NAME))
    }
}

impl FilmActor {
    pub fn actor(&self) -> Actor {
        Actor::at(self.table.to(Actor::NAME))
    }

    pub fn film(&self) -> Film {
        Film::at(self.table.to(Film::NAME))
    }
}

impl FilmCategory {
    pub fn film(&self) -> Film {
        Film::at(self.table.to(Film::NAME))
    }

    pub fn category(&self) -> Category {
        Category::at(self.table.to(Category::NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_fields_match_the_bundled_schema() {
        let registry = SchemaRegistry::bundled().unwrap();

        let film = film();
        let table = registry.table(Film::NAME).unwrap();
        assert!(table.field::<i16>(film.language_id.name()).is_ok());
        assert!(table.field::<f64>(film.rental_rate.name()).is_ok());

        let fa = film_actor();
        let table = registry.table(FilmActor::NAME).unwrap();
        assert!(table.field::<i16>(fa.actor_id.name()).is_ok());
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn test_relationship_paths() {
        let fa = film_actor();

        let language = fa.film().original_language();
        assert_eq!(language.name.table().reference(), "film_actor__film__original_language");
        assert_eq!(language.table_ref().name(), "language");

        let fc = film_category();
        assert_eq!(fc.category().name.table().reference(), "film_category__category");
        assert_eq!(fc.film().title.table().reference(), "film_category__film");
    }

    #[test]
    fn test_aliased_tables() {
        let a = Actor::aliased("a");

        assert_eq!(a.actor_id.table().reference(), "a");
        assert_eq!(a.actor_id.table().name(), "actor");
    }
}
