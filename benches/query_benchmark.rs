use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use filmdb::config::DatabaseConfig;
use filmdb::model::{ActorName, ActorWithFilms};
use filmdb::tables::{actor, category, film, film_actor, film_category};
use filmdb::{DataSource, Executor, SelectQuery, multiset, select, select_from};
use std::hint::black_box;

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

fn actors_with_films(limit: usize) -> SelectQuery {
    let (a, fa) = (actor(), film_actor());
    select((
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
    .limit(limit)
}

fn bench_horror_actors(c: &mut Criterion) {
    let source = DataSource::open(&DatabaseConfig::default()).unwrap();
    let mut conn = source.connect();
    let mut group = c.benchmark_group("Horror_Actors");

    let explicit = horror_actors_explicit();
    group.bench_function("explicit_joins", |b| {
        b.iter(|| {
            let actors: Vec<ActorName> = conn.fetch_into(black_box(&explicit)).unwrap();
            black_box(actors);
        });
    });

    let implicit = horror_actors_implicit();
    group.bench_function("implicit_joins", |b| {
        b.iter(|| {
            let actors: Vec<ActorName> = conn.fetch_into(black_box(&implicit)).unwrap();
            black_box(actors);
        });
    });
    group.finish();
}

fn bench_render_sql(c: &mut Criterion) {
    let source = DataSource::open(&DatabaseConfig::default()).unwrap();
    let mut group = c.benchmark_group("Render_SQL");

    group.bench_function("select_from_film", |b| {
        let query = select_from(&film());
        b.iter(|| black_box(query.to_sql(source.registry()).unwrap()));
    });
    group.bench_function("implicit_joins", |b| {
        let query = horror_actors_implicit();
        b.iter(|| black_box(query.to_sql(source.registry()).unwrap()));
    });
    group.finish();
}

fn bench_multiset_scaling(c: &mut Criterion) {
    let source = DataSource::open(&DatabaseConfig::default()).unwrap();
    let mut conn = source.connect();
    let mut group = c.benchmark_group("Multiset_Actors_With_Films");

    for n in [10, 200].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let query = actors_with_films(n);
            b.iter(|| {
                let actors: Vec<ActorWithFilms> = conn.fetch_into(&query).unwrap();
                black_box(actors);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_horror_actors, bench_render_sql, bench_multiset_scaling);
criterion_main!(benches);
