use std::process::ExitCode;

use tracing::{error, info};

use filmdb::model::{ActorName, ActorWithFilms};
use filmdb::tables::{actor, category, film, film_actor, film_category};
use filmdb::{Config, Connection, DataSource, Executor, Result, multiset, select, select_from};

fn main() -> ExitCode {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter())
        .init();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let source = DataSource::open(&config.database)?;
    let mut conn = source.connect();
    info!(source = source.name(), "connected");

    let f = film();
    let query = select_from(&f);
    println!("{}", query.to_sql(source.registry())?);
    println!("  {} films\n", conn.fetch(&query)?.len());

    horror_actors(&mut conn, source.registry())?;

    let query = select_from(&f).filter(f.film_id.eq(1));
    println!("{}", query.to_sql(source.registry())?);
    if let Some(record) = conn.fetch_one(&query)? {
        println!("  film 1 is {}\n", record.get(&f.title)?);
    }

    let (a, fa) = (actor(), film_actor());
    let query = select((
        &a.first_name,
        &a.last_name,
        multiset(
            select((&fa.film().title,))
                .from(&fa)
                .filter(fa.actor_id.eq(a.actor_id.cast::<i16>()))
                .order_by((&fa.film().title,)),
        )
        .as_("films"),
    ))
    .from(&a)
    .order_by((&a.actor_id,))
    .limit(3);
    println!("{}", query.to_sql(source.registry())?);
    for entry in conn.fetch_into::<ActorWithFilms>(&query)? {
        let titles: Vec<&str> = entry.films.iter().map(|film| film.name.as_str()).collect();
        println!("  {} {}: {}", entry.first_name, entry.last_name, titles.join(", "));
    }
    Ok(())
}

fn horror_actors(conn: &mut Connection, registry: &filmdb::SchemaRegistry) -> Result<()> {
    let (a, fa, f, fc, c) = (actor(), film_actor(), film(), film_category(), category());
    let explicit = select((&a.first_name, &a.last_name))
        .from(&a)
        .join(&fa, fa.actor_id.eq(a.actor_id.cast::<i16>()))
        .join(&f, fa.film_id.eq(f.film_id.cast::<i16>()))
        .join(&fc, fc.film_id.eq(f.film_id.cast::<i16>()))
        .join(&c, fc.category_id.eq(c.category_id.cast::<i16>()))
        .filter(c.name.eq("Horror"))
        .group_by((&a.first_name, &a.last_name))
        .order_by((&a.first_name, &a.last_name));
    println!("{}", explicit.to_sql(registry)?);
    println!("  {} actors\n", conn.fetch_into::<ActorName>(&explicit)?.len());

    let cast = fa.actor();
    let (first_name, last_name) = (&cast.first_name, &cast.last_name);
    let implicit = select((first_name, last_name))
        .from(&fa)
        .join(&fc, fa.film_id.eq(&fc.film_id))
        .filter(fc.category().name.eq("Horror"))
        .group_by((first_name, last_name))
        .order_by((first_name, last_name));
    println!("{}", implicit.to_sql(registry)?);
    println!("  {} actors\n", conn.fetch_into::<ActorName>(&implicit)?.len());
    Ok(())
}
