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
//! End-to-end scenarios
//!
//! Whole-runtime behaviour: plugins registering systems, fixed-step
//! drivers, component metadata and teardown.

use ecs_runtime::ecs::{Component, Event, QuerySpec, Resource, System, Term};
use ecs_runtime::plugins::plugin_fn;
use ecs_runtime::{groups, App, EcsError, World};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Default, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
    z: f64,
}
impl Component for Position {}

#[derive(Debug, Default, Clone, PartialEq)]
struct Velocity {
    x: f64,
}
impl Component for Velocity {}

#[derive(Debug, Default)]
struct Renderable;
impl Component for Renderable {}

#[derive(Debug, Clone, PartialEq)]
enum Collider {
    Cuboid { half_extent: f64 },
    Sphere { radius: f64 },
}
impl Component for Collider {}

#[derive(Debug, Default)]
struct Player;
impl Component for Player {}

#[derive(Debug, Default)]
struct Idle;
impl Component for Idle {}

#[derive(Debug, Default)]
struct Running;
impl Component for Running {}

#[derive(Debug, Default)]
struct Character;
impl Component for Character {}

struct Tracked {
    id: u32,
    log: Rc<RefCell<Vec<u32>>>,
}
impl Component for Tracked {
    fn dispose(&mut self) {
        self.log.borrow_mut().push(self.id);
    }
}

struct Texture {
    disposed: Rc<Cell<usize>>,
}
impl Resource for Texture {
    fn dispose(&mut self) {
        self.disposed.set(self.disposed.get() + 1);
    }
}

#[derive(Debug, PartialEq)]
struct Collision(u32);
impl Event for Collision {}

#[test]
fn test_fixed_step_moves_position() {
    let mut app = App::new();
    let entity = app.world.spawn_bundle((Position::default(),));
    app.add_system(
        groups::FIXED,
        System::new(
            "integrate",
            QuerySpec::new().key("bodies", [Term::read::<Position>()]),
            |ctx| {
                let mut bodies = ctx.fetch::<&mut Position>("bodies")?;
                for &body in bodies.entities() {
                    bodies.get(body)?.x += 1.0;
                }
                Ok(())
            },
        ),
    )
    .unwrap();

    let mut fixed = app.runner(groups::FIXED);
    for _ in 0..3 {
        fixed().unwrap();
    }
    drop(fixed);

    let position = app.world.get::<Position>(entity).unwrap();
    assert_eq!(*position, Position { x: 3.0, y: 0.0, z: 0.0 });
}

#[test]
fn test_add_keeps_one_instance_per_type() {
    let mut world = World::new();
    let entity = world.spawn();
    let mut handle = world.entity_mut(entity).unwrap();
    handle.add::<Velocity>().unwrap();
    handle.add_new(Velocity { x: 2.0 }).unwrap();
    handle.add_with::<Velocity, _>(|v| v.x = 5.0).unwrap();

    assert_eq!(handle.get::<Velocity>().unwrap().x, 5.0);
    let mut state = world
        .query(QuerySpec::new().key("moving", [Term::read::<Velocity>()]))
        .unwrap();
    let resolved = state.resolve(&mut world).unwrap();
    assert_eq!(resolved.view("moving").unwrap().entities(), [entity]);
}

#[test]
fn test_filter_composition() {
    let mut world = World::new();
    let moving = world.spawn_bundle((Position::default(), Velocity::default()));
    let bare = world.spawn_bundle((Position::default(),));
    world.spawn_bundle((Position::default(), Renderable));

    let mut state = world
        .query(QuerySpec::new().key(
            "targets",
            [
                Term::read::<Position>(),
                Term::present::<Velocity>().or(Term::absent::<Renderable>()),
            ],
        ))
        .unwrap();
    let resolved = state.resolve(&mut world).unwrap();
    assert_eq!(resolved.view("targets").unwrap().entities(), [moving, bare]);
}

#[test]
fn test_missing_component_error() {
    let mut world = World::new();
    let entity = world.spawn_bundle((Position::default(),));

    match world.get::<Velocity>(entity) {
        Err(EcsError::MissingComponent { entity: e, component }) => {
            assert_eq!(e, entity);
            assert_eq!(component, "Velocity");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("entity has no velocity"),
    }
    assert!(world.try_get::<Velocity>(entity).is_none());
}

#[test]
fn test_collider_variants_share_one_identity() {
    let mut world = World::new();
    let cube = world.spawn_bundle((Collider::Cuboid { half_extent: 0.5 },));
    let ball = world.spawn_bundle((Collider::Sphere { radius: 1.0 },));

    let mut state = world
        .query(QuerySpec::new().key("colliders", [Term::read::<Collider>()]))
        .unwrap();
    let resolved = state.resolve(&mut world).unwrap();
    let view = resolved.view("colliders").unwrap();
    assert_eq!(view.entities(), [cube, ball]);

    let mut colliders = view.fetch::<&Collider>(&world).unwrap();
    let spheres = [cube, ball]
        .into_iter()
        .filter(|&e| matches!(colliders.get(e), Ok(Collider::Sphere { .. })))
        .count();
    assert_eq!(spheres, 1);
    drop(colliders);

    // Switching variant replaces the instance in place.
    world.insert(cube, Collider::Sphere { radius: 0.5 }).unwrap();
    assert_eq!(
        *world.get::<Collider>(cube).unwrap(),
        Collider::Sphere { radius: 0.5 }
    );
}

#[test]
fn test_unique_component_moves_between_entities() {
    let mut world = World::new();
    world.register_unique::<Player>();
    let first = world.spawn_bundle((Player,));
    let second = world.spawn_bundle((Player,));

    assert!(!world.has::<Player>(first));
    assert!(world.has::<Player>(second));
}

#[test]
fn test_states_of_a_base_are_exclusive() {
    let mut world = World::new();
    world.register_state_of::<Idle, Character>();
    world.register_state_of::<Running, Character>();
    let hero = world.spawn_bundle((Character, Idle));

    world.insert(hero, Running).unwrap();
    assert!(world.has::<Running>(hero));
    assert!(!world.has::<Idle>(hero));

    world.remove_component::<Character>(hero);
    assert!(!world.has::<Running>(hero));
}

#[test]
fn test_replacing_a_resource_twice_disposes_twice() {
    let disposed = Rc::new(Cell::new(0));
    let mut world = World::new();
    for _ in 0..3 {
        world.resources_mut().add_new(Texture {
            disposed: disposed.clone(),
        });
    }
    assert_eq!(disposed.get(), 2);
    drop(world);
    assert_eq!(disposed.get(), 3);
}

#[test]
fn test_components_are_disposed_once_on_every_path() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let tracked = |id| Tracked {
        id,
        log: log.clone(),
    };

    let mut world = World::new();
    let replaced = world.spawn_bundle((tracked(1),));
    world.insert(replaced, tracked(2)).unwrap();

    let removed = world.spawn_bundle((tracked(3),));
    world.remove_component::<Tracked>(removed);
    world.remove_component::<Tracked>(removed);

    let despawned = world.spawn_bundle((tracked(4),));
    world.despawn(despawned);
    world.despawn(despawned);

    world.spawn_bundle((tracked(5),));
    assert!(matches!(
        world.insert(despawned, tracked(6)),
        Err(EcsError::DeadEntity(_))
    ));
    drop(world);

    assert_eq!(*log.borrow(), [1, 3, 4, 6, 2, 5]);
}

#[test]
fn test_handles_from_before_clear_stay_dead() {
    let mut world = World::new();
    let despawned = world.spawn();
    world.insert(despawned, Player).unwrap();
    world.despawn(despawned);
    let live = world.spawn();
    world.insert(live, Player).unwrap();

    world.clear();
    let fresh = world.spawn();
    world.insert(fresh, Player).unwrap();

    assert!(world.is_alive(fresh));
    assert!(!world.is_alive(despawned));
    assert!(!world.is_alive(live));
    assert_ne!(fresh, despawned);
    assert_ne!(fresh, live);
    assert!(world.get::<Player>(despawned).is_err());
    assert!(world.get::<Player>(live).is_err());
}

#[test]
fn test_plugins_wire_systems_and_events() {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();

    let mut app = App::new();
    app.add_plugin(
        plugin_fn("collisions", move |app: &mut App| {
            let sink = sink.clone();
            app.add_system(
                groups::UPDATE,
                System::new("report", QuerySpec::new(), move |ctx| {
                    sink.borrow_mut().extend(ctx.drain_events::<Collision>());
                    Ok(())
                }),
            )?;
            Ok(())
        })
        .after("physics"),
    )
    .unwrap();
    app.add_plugin(plugin_fn("physics", |app: &mut App| {
        app.add_system(
            groups::UPDATE,
            System::new("detect", QuerySpec::new().commands(), |ctx| {
                ctx.commands()?.emit(Collision(7));
                Ok(())
            }),
        )?;
        Ok(())
    }))
    .unwrap();
    app.build_plugins().unwrap();

    assert_eq!(app.scheduler.order(groups::UPDATE).unwrap(), ["detect", "report"]);
    app.run_group(groups::UPDATE).unwrap();
    assert_eq!(*received.borrow(), [Collision(7)]);
}

#[test]
fn test_typed_fetch_must_match_declared_terms() {
    let mut world = World::new();
    world.spawn_bundle((Position::default(), Velocity::default()));

    let mut state = world
        .query(QuerySpec::new().key(
            "bodies",
            [Term::read::<Position>(), Term::read::<Velocity>()],
        ))
        .unwrap();
    let resolved = state.resolve(&mut world).unwrap();
    let view = resolved.view("bodies").unwrap();

    assert!(view.fetch::<(&Position, &Velocity)>(&world).is_ok());
    assert!(matches!(
        view.fetch::<(&Velocity, &Position)>(&world),
        Err(EcsError::FetchMismatch { .. })
    ));
    assert!(matches!(
        resolved.view("missing"),
        Err(EcsError::UnknownKey(_))
    ));
}
