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
//! Fixed-step driver example
//!
//! Drives the `fixed` run group from a fixed-timestep accumulator loop and
//! the `update` group once per simulated frame. Falling bodies are removed
//! through deferred commands once they hit the floor.
//!
//! Run with `RUST_LOG=ecs_runtime=debug` to see scheduler and flush logs.
//! Set `ECS_RUNTIME_STRICT_RESOURCES=1` to turn resource-gate skips into
//! errors.

use ecs_runtime::ecs::scheduler::SchedulerConfig;
use ecs_runtime::ecs::{Component, Event, QuerySpec, Resource, System, Term};
use ecs_runtime::plugins::plugin_fn;
use ecs_runtime::{groups, App, Result};
use tracing_subscriber::EnvFilter;

const FIXED_DT: f64 = 1.0 / 60.0;
const FRAME_DT: f64 = 1.0 / 24.0;

#[derive(Debug, Default)]
struct Position {
    y: f64,
}
impl Component for Position {}

#[derive(Debug, Default)]
struct Velocity {
    y: f64,
}
impl Component for Velocity {}

#[derive(Debug)]
struct Name(&'static str);
impl Component for Name {}

#[derive(Debug, Default)]
struct Time {
    elapsed: f64,
    steps: u64,
}
impl Resource for Time {}

#[derive(Debug)]
struct Gravity(f64);
impl Resource for Gravity {}

#[derive(Debug)]
struct Landed {
    name: &'static str,
    at: f64,
}
impl Event for Landed {}

fn physics(app: &mut App) -> Result<()> {
    app.world.resources_mut().add_new(Gravity(-9.81));

    let clock = app.add_system(
        groups::FIXED,
        System::new("clock", QuerySpec::new().resources([Term::read::<Time>()]), |ctx| {
            let mut time = ctx.resource_mut::<Time>()?;
            time.elapsed += FIXED_DT;
            time.steps += 1;
            Ok(())
        }),
    )?;

    let integrate = app.add_system(
        groups::FIXED,
        System::new(
            "integrate",
            QuerySpec::new()
                .resources([Term::read::<Gravity>()])
                .key("bodies", [Term::read::<Position>(), Term::read::<Velocity>()]),
            |ctx| {
                let gravity = ctx.resource::<Gravity>()?.0;
                let mut bodies = ctx.fetch::<(&mut Position, &mut Velocity)>("bodies")?;
                for &body in bodies.entities() {
                    let (mut position, mut velocity) = bodies.get(body)?;
                    velocity.y += gravity * FIXED_DT;
                    position.y += velocity.y * FIXED_DT;
                }
                Ok(())
            },
        )
        .after(clock),
    )?;

    app.add_system(
        groups::FIXED,
        System::new(
            "floor",
            QuerySpec::new()
                .resources([Term::read::<Time>()])
                .key("bodies", [Term::read::<Position>(), Term::read::<Name>()])
                .commands(),
            |ctx| {
                let at = ctx.resource::<Time>()?.elapsed;
                let mut landed = Vec::new();
                {
                    let mut bodies = ctx.fetch::<(&Position, &Name)>("bodies")?;
                    for &body in bodies.entities() {
                        let (position, name) = bodies.get(body)?;
                        if position.y <= 0.0 {
                            landed.push((body, name.0));
                        }
                    }
                }
                let mut commands = ctx.commands()?;
                for (body, name) in landed {
                    commands.despawn(body);
                    commands.emit(Landed { name, at });
                }
                Ok(())
            },
        )
        .after(integrate),
    )?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("ECS Runtime - Fixed Step Example");
    println!("================================\n");

    let mut app = App::with_config(SchedulerConfig::from_env());
    app.add_plugin(plugin_fn("physics", physics))?;
    app.add_plugin(
        plugin_fn("report", |app: &mut App| {
            app.add_system(
                groups::UPDATE,
                System::new("report", QuerySpec::new(), |ctx| {
                    for event in ctx.drain_events::<Landed>() {
                        println!("  {} landed at t = {:.3}s", event.name, event.at);
                    }
                    Ok(())
                }),
            )?;
            Ok(())
        })
        .after("physics"),
    )?;
    app.build_plugins()?;

    for (name, height) in [("crate", 1.0), ("barrel", 2.5), ("anvil", 0.5)] {
        app.world
            .spawn_bundle((Name(name), Position { y: height }, Velocity::default()));
    }
    println!("Spawned {} bodies", app.world.entity_count());

    // Time is installed late; systems gated on it are skipped until then.
    let report = app.run_group(groups::FIXED)?;
    println!("Skipped before setup: {:?}", report.skipped);
    app.world.resources_mut().add::<Time>();

    let mut accumulator = 0.0;
    let mut frames = 0;
    while app.world.entity_count() > 0 && frames < 240 {
        accumulator += FRAME_DT;
        while accumulator >= FIXED_DT {
            app.run_group(groups::FIXED)?;
            accumulator -= FIXED_DT;
        }
        app.run_group(groups::UPDATE)?;
        frames += 1;
    }

    let time = app.world.resources().get::<Time>()?;
    println!(
        "\nSimulated {} fixed steps over {} frames ({:.3}s)",
        time.steps, frames, time.elapsed
    );
    Ok(())
}
