use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use filmdb::config::DatabaseConfig;
use filmdb::field::TypedTable;
use filmdb::model::{ActorName, ActorWithFilms, FilmName};
use filmdb::record::Cell;
use filmdb::sample::{ACTOR_COUNT, FILM_COUNT, HORROR_ACTORS};
use filmdb::tables::{Language, actor, category, film, film_actor, film_category};
use filmdb::{
    DataSource, Error, ExecutionError, Executor, SchemaError, SchemaRegistry, SelectQuery, ShapeMismatch, Value,
    count, insert_into, multiset, select, select_from,
};

/// The sample database, loaded once and shared by every test. Each test runs
/// in a transaction that is rolled back, so none of them sees another's rows.
fn source() -> &'static DataSource {
    static SOURCE: OnceLock<DataSource> = OnceLock::new();
    SOURCE.get_or_init(|| DataSource::open(&DatabaseConfig::default()).unwrap())
}

fn horror_actors_explicit() -> SelectQuery {
    let (a, fa, f, fc, c) = (actor(), film_actor(), film(), film_category(), category());
    select((&a.first_name, &a.last_name))
        .from(&a)
        .join(&fa, fa.actor_id.eq(a.actor_id.cast::<i16>()))
        .join(&f, fa.film_id.eq(f.film_id.cast::<i16>()))
        .join(&fc, fc.film_id.eq(f.film_id.cast::<i16>()))
        .join(&c, fc.category_id.eq(c.category_id.cast::<i16>()))
        .filter(c.name.eq("Horror"))
        .group_by((&a.first_name, &a.last_name))
        .order_by((&a.first_name, &a.last_name))
}

fn horror_actors_implicit() -> SelectQuery {
    let (fa, fc) = (film_actor(), film_category());
    let cast = fa.actor();
    select((&cast.first_name, &cast.last_name))
        .from(&fa)
        .join(&fc, fa.film_id.eq(&fc.film_id))
        .filter(fc.category().name.eq("Horror"))
        .group_by((&cast.first_name, &cast.last_name))
        .order_by((&cast.first_name, &cast.last_name))
}

#[test]
fn test_find_all_films() {
    source()
        .connect()
        .rollback_after(|tx| {
            let records = tx.fetch(&select_from(&film()))?;
            assert_eq!(records.len(), FILM_COUNT as usize);

            // the same rows as the hand-written statement
            let raw = tx.fetch_raw("SELECT * FROM film")?;
            let mapped: Vec<Vec<Value>> = records
                .iter()
                .map(|r| r.cells().iter().filter_map(Cell::as_value).cloned().collect())
                .collect();
            assert_eq!(mapped, raw.rows);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_horror_actors_with_explicit_joins() {
    source()
        .connect()
        .rollback_after(|tx| {
            let records = tx.fetch(&horror_actors_explicit())?;
            assert_eq!(records.len(), HORROR_ACTORS);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_horror_actors_with_implicit_joins() {
    source()
        .connect()
        .rollback_after(|tx| {
            let explicit: Vec<(String, String)> = tx.fetch_into(&horror_actors_explicit())?;
            let implicit: Vec<(String, String)> = tx.fetch_into(&horror_actors_implicit())?;

            assert_eq!(implicit.len(), HORROR_ACTORS);
            assert_eq!(implicit, explicit);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_horror_actors_into_record() {
    source()
        .connect()
        .rollback_after(|tx| {
            let actors: Vec<ActorName> = tx.fetch_into(&horror_actors_implicit())?;

            assert_eq!(actors.len(), HORROR_ACTORS);
            let distinct: HashSet<&ActorName> = actors.iter().collect();
            assert_eq!(distinct.len(), HORROR_ACTORS);
            assert!(actors.windows(2).all(|w| (&w[0].first_name, &w[0].last_name) < (&w[1].first_name, &w[1].last_name)));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_mapped_rows_match_raw_sql() {
    source()
        .connect()
        .rollback_after(|tx| {
            let query = horror_actors_implicit();
            let sql = query.to_sql(tx.registry())?;

            let names = tx.fetch_mapped(&query, |(first, last): (String, String)| format!("{first} {last}"))?;
            let raw: Vec<String> = tx
                .fetch_raw(&sql)?
                .rows
                .iter()
                .map(|row| format!("{} {}", row[0], row[1]))
                .collect();
            assert_eq!(names, raw);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_implicit_join_sql_is_deterministic() {
    let registry = SchemaRegistry::bundled().unwrap();

    let first = horror_actors_implicit().to_sql(&registry).unwrap();
    let second = horror_actors_implicit().to_sql(&registry).unwrap();

    assert_eq!(first, second);
    assert!(first.contains(
        "INNER JOIN actor AS film_actor__actor ON film_actor.actor_id = film_actor__actor.actor_id"
    ));
}

#[test]
fn test_insert_film() {
    source()
        .connect()
        .rollback_after(|tx| {
            let f = film();
            let outcome = tx.insert(
                &insert_into(&f)
                    .columns((&f.title, &f.language_id))
                    .values(("Test", 1_i16)),
            )?;
            assert_eq!(outcome.rows_affected, 1);
            assert_eq!(outcome.generated_keys, vec![Value::Int(i64::from(FILM_COUNT) + 1)]);

            let inserted = tx
                .fetch_one(&select_from(&f).filter(f.title.eq("Test")))?
                .expect("inserted film");
            assert_eq!(inserted.get(&f.language_id)?, 1);
            assert_eq!(inserted.get_opt(&f.description)?, None);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_insert_film_using_record() {
    source()
        .connect()
        .rollback_after(|tx| {
            let f = film();
            let mut record = tx.new_record(&f)?;
            record.set(&f.title, "Test")?.set(&f.language_id, 1_i16)?;

            assert_eq!(tx.store(&mut record)?, 1);
            let film_id = record.get(&f.film_id)?.expect("generated key");

            let stored = tx.fetch_one(&select_from(&f).filter(f.film_id.eq(film_id)))?;
            assert_eq!(stored.map(|r| r.get(&f.title)).transpose()?.as_deref(), Some("Test"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_find_film_by_key() {
    source()
        .connect()
        .rollback_after(|tx| {
            let f = film();

            let found = tx.fetch_one(&select_from(&f).filter(f.film_id.eq(1)))?;
            let found = found.expect("film 1");
            assert_eq!(found.get(&f.title)?, "ACADEMY DINOSAUR");

            let missing = tx.fetch_one(&select_from(&f).filter(f.film_id.eq(FILM_COUNT + 1)))?;
            assert!(missing.is_none());

            let several = tx.fetch_one(&select_from(&f).filter(f.film_id.le(2)));
            assert!(matches!(several, Err(Error::Shape(ShapeMismatch::TooManyRows(2)))));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_actors_with_films() {
    source()
        .connect()
        .rollback_after(|tx| {
            let (a, fa) = (actor(), film_actor());
            let films = multiset(
                select((&fa.film().title,))
                    .from(&fa)
                    .filter(fa.actor_id.eq(a.actor_id.cast::<i16>()))
                    .order_by((&fa.film().title,)),
            );
            let query = select((&a.actor_id, &a.first_name, &a.last_name, films.clone().as_("films"))).from(&a);

            let actors: Vec<(i32, String, String, Vec<FilmName>)> = tx.fetch_into(&query)?;
            assert_eq!(actors.len(), ACTOR_COUNT as usize);

            let counted: HashMap<i16, i64> = tx.fetch_into::<(i16, i64)>(
                &select((&fa.actor_id, count())).from(&fa).group_by((&fa.actor_id,)),
            )?
            .into_iter()
            .collect();
            for (actor_id, _, _, titles) in &actors {
                let expected = counted.get(&(*actor_id as i16)).copied().unwrap_or(0);
                assert_eq!(titles.len() as i64, expected, "actor {actor_id}");
                assert!(titles.windows(2).all(|w| w[0].name <= w[1].name));
            }

            let typed: Vec<ActorWithFilms> = tx.fetch_into(
                &select((&a.first_name, &a.last_name, films.as_("films"))).from(&a),
            )?;
            let total: usize = typed.iter().map(|entry| entry.films.len()).sum();
            assert_eq!(total as i64, counted.values().sum::<i64>());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_actor_without_films_has_empty_list() {
    source()
        .connect()
        .rollback_after(|tx| {
            let (a, fa) = (actor(), film_actor());
            let outcome = tx.insert(&insert_into(&a).set(&a.first_name, "NEW").set(&a.last_name, "FACE"))?;
            let Some(Value::Int(new_id)) = outcome.generated_keys.first().cloned() else {
                panic!("no generated key");
            };

            let query = select((
                &a.first_name,
                &a.last_name,
                multiset(
                    select((&fa.film().title,))
                        .from(&fa)
                        .filter(fa.actor_id.eq(a.actor_id.cast::<i16>())),
                )
                .as_("films"),
            ))
            .from(&a)
            .filter(a.actor_id.eq(new_id as i32));

            let actors: Vec<ActorWithFilms> = tx.fetch_into(&query)?;
            assert_eq!(
                actors,
                vec![ActorWithFilms {
                    first_name: "NEW".into(),
                    last_name: "FACE".into(),
                    films: vec![],
                }]
            );
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_multiset_limit_is_per_actor() {
    source()
        .connect()
        .rollback_after(|tx| {
            let (a, fa) = (actor(), film_actor());
            let films = multiset(
                select((&fa.film_id,))
                    .from(&fa)
                    .filter(fa.actor_id.eq(a.actor_id.cast::<i16>()))
                    .order_by((fa.film_id.desc(),))
                    .limit(2),
            );

            let rows: Vec<(i32, Vec<(i16,)>)> = tx.fetch_into(&select((&a.actor_id, films)).from(&a))?;
            assert_eq!(rows.len(), ACTOR_COUNT as usize);
            assert!(rows.iter().all(|(_, films)| films.len() <= 2));
            assert!(rows.iter().filter(|(_, films)| films.len() == 2).count() > 100);
            for (_, films) in &rows {
                assert!(films.windows(2).all(|w| w[0].0 > w[1].0));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_optional_relationship_keeps_rows() {
    source()
        .connect()
        .rollback_after(|tx| {
            let f = film();
            let original = f.original_language();

            let rows: Vec<(String, Option<String>)> =
                tx.fetch_into(&select((&f.title, &original.name)).from(&f))?;

            assert_eq!(rows.len(), FILM_COUNT as usize);
            assert_eq!(rows.iter().filter(|(_, name)| name.is_some()).count(), 100);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_relationship_errors() {
    source()
        .connect()
        .rollback_after(|tx| {
            let f = film();
            let ambiguous = Language::at(f.table_ref().to("language"));
            match tx.fetch(&select((&f.title, &ambiguous.name)).from(&f)) {
                Err(Error::Schema(SchemaError::AmbiguousRelationship { candidates, .. })) => {
                    assert_eq!(candidates, vec!["language".to_string(), "original_language".to_string()]);
                }
                other => panic!("expected an ambiguous relationship, got {other:?}"),
            }

            let a = actor();
            let unknown = filmdb::tables::Category::at(a.table_ref().to("category"));
            let result = tx.fetch(&select((&unknown.name,)).from(&a));
            assert!(matches!(result, Err(Error::Schema(SchemaError::UnknownRelationship { .. }))));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_shape_mismatch() {
    source()
        .connect()
        .rollback_after(|tx| {
            let a = actor();
            let query = select((&a.actor_id, &a.first_name, &a.last_name)).from(&a);

            let result = tx.fetch_into::<ActorName>(&query);
            assert!(matches!(
                result,
                Err(Error::Shape(ShapeMismatch::Arity { expected: 2, found: 3 }))
            ));

            let result = tx.fetch_into::<(String, String, String)>(&query);
            assert!(matches!(result, Err(Error::Shape(ShapeMismatch::Type { .. }))));
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_foreign_key_violation_leaves_no_row() {
    source()
        .connect()
        .rollback_after(|tx| {
            let fa = film_actor();
            let result = tx.insert(
                &insert_into(&fa)
                    .columns((&fa.actor_id, &fa.film_id))
                    .values((2_i16, 1000_i16))
                    .values((999_i16, 1_i16)),
            );
            assert!(matches!(
                result,
                Err(Error::Execution(ExecutionError::ForeignKeyViolation { .. }))
            ));

            let rows = tx.fetch(
                &select((&fa.film_id,))
                    .from(&fa)
                    .filter(fa.actor_id.eq(999_i16).or(fa.actor_id.eq(2_i16).and(fa.film_id.eq(1000_i16)))),
            )?;
            assert!(rows.is_empty());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_commit_is_visible_to_other_connections() {
    let source = DataSource::with_registry("isolated", SchemaRegistry::bundled().unwrap()).unwrap();
    let c = category();
    let names = |conn: &mut filmdb::Connection| -> Vec<String> {
        conn.fetch_into::<(String,)>(&select((&c.name,)).from(&c).order_by((&c.name,)))
            .unwrap()
            .into_iter()
            .map(|(name,)| name)
            .collect()
    };

    source
        .connect()
        .transaction(|tx| tx.insert(&insert_into(&c).set(&c.name, "Kept")))
        .unwrap();
    source
        .connect()
        .rollback_after(|tx| tx.insert(&insert_into(&c).set(&c.name, "Discarded")))
        .unwrap();
    let failed: filmdb::Result<()> = source.connect().transaction(|tx| {
        tx.insert(&insert_into(&c).set(&c.name, "Failed"))?;
        Err(Error::Config("abort".into()))
    });
    assert!(failed.is_err());

    assert_eq!(names(&mut source.connect()), vec!["Kept".to_string()]);
}
