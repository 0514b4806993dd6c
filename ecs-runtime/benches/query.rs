// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Benchmarks for query resolution and typed fetches

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ecs_runtime::ecs::{Component, QuerySpec, Term};
use ecs_runtime::World;

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    x: f64,
}
impl Component for Position {}

#[derive(Debug, Clone, Copy, Default)]
struct Velocity {
    x: f64,
}
impl Component for Velocity {}

#[derive(Debug, Clone, Copy, Default)]
struct Frozen;
impl Component for Frozen {}

/// Every third entity is frozen; every entity moves.
fn populate(count: usize) -> World {
    let mut world = World::new();
    for i in 0..count {
        let entity = world.spawn_bundle((Position { x: i as f64 }, Velocity { x: 1.0 }));
        if i % 3 == 0 {
            let _ = world.insert(entity, Frozen);
        }
    }
    world
}

/// Benchmark: Resolve a filtered key
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_resolve");

    for entity_count in [100, 1000, 10000].iter() {
        let mut world = populate(*entity_count);
        let mut state = world
            .query(QuerySpec::new().key(
                "movers",
                [
                    Term::read::<Position>(),
                    Term::read::<Velocity>(),
                    Term::absent::<Frozen>(),
                ],
            ))
            .expect("valid query");

        group.throughput(Throughput::Elements(*entity_count as u64));
        group.bench_function(BenchmarkId::from_parameter(entity_count), |b| {
            b.iter(|| {
                let resolved = state.resolve(&mut world);
                black_box(resolved.map(|r| r.views().len()));
            });
        });
    }

    group.finish();
}

/// Benchmark: Resolve a Changed filter when only a few entities changed
fn bench_changed(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_changed");

    for entity_count in [1000, 10000].iter() {
        let mut world = populate(*entity_count);
        let entities: Vec<_> = world.entities().step_by(100).collect();
        let mut state = world
            .query(QuerySpec::new().key("moved", [Term::changed::<Position>()]))
            .expect("valid query");

        group.bench_function(BenchmarkId::from_parameter(entity_count), |b| {
            b.iter(|| {
                for &entity in &entities {
                    if let Ok(mut position) = world.get_mut::<Position>(entity) {
                        position.x += 1.0;
                    }
                }
                let resolved = state.resolve(&mut world);
                black_box(resolved.map(|r| r.views()[0].len()));
            });
        });
    }

    group.finish();
}

/// Benchmark: Integrate velocities through a typed fetch
fn bench_fetch_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_fetch_update");

    for entity_count in [100, 1000, 10000].iter() {
        let mut world = populate(*entity_count);
        let mut state = world
            .query(QuerySpec::new().key(
                "movers",
                [Term::read::<Position>(), Term::read::<Velocity>()],
            ))
            .expect("valid query");

        group.throughput(Throughput::Elements(*entity_count as u64));
        group.bench_function(BenchmarkId::from_parameter(entity_count), |b| {
            b.iter(|| {
                let Some(resolved) = state.resolve(&mut world) else {
                    return;
                };
                let Ok(view) = resolved.view("movers") else {
                    return;
                };
                let Ok(mut movers) = view.fetch::<(&mut Position, &Velocity)>(&world) else {
                    return;
                };
                for &entity in movers.entities() {
                    if let Ok((mut position, velocity)) = movers.get(entity) {
                        position.x += velocity.x;
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_changed, bench_fetch_update);
criterion_main!(benches);
