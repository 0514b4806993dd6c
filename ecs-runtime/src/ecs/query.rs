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
//! Query resolution
//!
//! A [`QuerySpec`] maps logical keys to ordered lists of filter terms, plus
//! the two reserved keys: `resources` (a gate evaluated against the
//! singleton resource store) and `command` (grants the command interface).
//! A [`QueryState`] owns one checkpoint per key; every resolution evaluates
//! the terms relative to those checkpoints and then advances them, so
//! change detection is "since this key last ran", independently of any
//! other query.
//!
//! # Resolution
//!
//! For each key the engine starts from the live entities (narrowed to the
//! smallest store of a required type when there is one), keeps those that
//! satisfy every top-level term, and orders the result by entity creation.
//! Typed access to the matched values goes through [`Fetch`].

use crate::ecs::component::{Component, ComponentStore, ComponentTicks, Mut, RemovalRecord};
use crate::ecs::filter::Term;
use crate::ecs::identity::{ComponentId, ResourceId, TypeKey};
use crate::ecs::resource::Resources;
use crate::ecs::world::WorldId;
use crate::ecs::{Entity, World};
use crate::error::{EcsError, Result};
use std::cell::{Ref, RefCell, RefMut};

/// Reserved key selecting required resources
pub const RESOURCES_KEY: &str = "resources";

/// Reserved key granting access to the command buffer
pub const COMMAND_KEY: &str = "command";

/// Declarative description of what a system reads
///
/// ```
/// use ecs_runtime::ecs::{QuerySpec, Term};
///
/// struct Position;
/// struct Velocity;
/// struct Paused;
///
/// let spec = QuerySpec::new()
///     .key("moving", [Term::read::<Position>(), Term::read::<Velocity>()])
///     .resources([Term::absent::<Paused>()])
///     .commands();
/// assert!(spec.grants_commands());
/// ```
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    keys: Vec<(String, Vec<Term>)>,
    resources: Option<Vec<Term>>,
    commands: bool,
}

impl QuerySpec {
    /// Empty specification
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a key resolved against entities
    pub fn key(mut self, name: impl Into<String>, terms: impl IntoIterator<Item = Term>) -> Self {
        self.keys.push((name.into(), terms.into_iter().collect()));
        self
    }

    /// Declare resource requirements; the system is gated on them
    pub fn resources(mut self, terms: impl IntoIterator<Item = Term>) -> Self {
        self.resources
            .get_or_insert_with(Vec::new)
            .extend(terms);
        self
    }

    /// Request the command interface
    pub fn commands(mut self) -> Self {
        self.commands = true;
        self
    }

    /// Declared entity keys, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(|(name, _)| name.as_str())
    }

    /// Terms of the `resources` key, if declared
    pub fn resource_terms(&self) -> Option<&[Term]> {
        self.resources.as_deref()
    }

    /// Whether the `command` key was declared
    pub fn grants_commands(&self) -> bool {
        self.commands
    }

    fn validate(&self) -> Result<()> {
        for (index, (name, _)) in self.keys.iter().enumerate() {
            if name == RESOURCES_KEY || name == COMMAND_KEY {
                return Err(EcsError::ReservedKey(name.clone()));
            }
            if self.keys[..index].iter().any(|(other, _)| other == name) {
                return Err(EcsError::DuplicateKey(name.clone()));
            }
        }
        Ok(())
    }
}

trait Probe {
    type Id: Copy;

    fn present(&self, id: Self::Id) -> bool;
    fn ticks(&self, id: Self::Id) -> Option<ComponentTicks>;
    fn removal(&self, id: Self::Id) -> Option<RemovalRecord>;
}

struct EntityProbe<'w> {
    world: &'w World,
    entity: Entity,
}

impl Probe for EntityProbe<'_> {
    type Id = ComponentId;

    fn present(&self, id: ComponentId) -> bool {
        self.world.directory().has(self.entity, id)
    }

    fn ticks(&self, id: ComponentId) -> Option<ComponentTicks> {
        self.world.erased_store(id)?.ticks(self.entity)
    }

    fn removal(&self, id: ComponentId) -> Option<RemovalRecord> {
        self.world.erased_store(id)?.removal(self.entity)
    }
}

struct ResourceProbe<'w>(&'w Resources);

impl Probe for ResourceProbe<'_> {
    type Id = ResourceId;

    fn present(&self, id: ResourceId) -> bool {
        self.0.contains(id)
    }

    fn ticks(&self, id: ResourceId) -> Option<ComponentTicks> {
        self.0.ticks(id)
    }

    fn removal(&self, id: ResourceId) -> Option<RemovalRecord> {
        self.0.removal(id)
    }
}

/// A term with its type key resolved to an identity
///
/// `None` means the type was never registered, so nothing carries it.
#[derive(Debug, Clone)]
enum Compiled<I> {
    Present(Option<I>),
    Absent(Option<I>),
    Added(Option<I>),
    Changed(Option<I>),
    Removed(Option<I>),
    Always,
    Any(Vec<Compiled<I>>),
}

impl<I: Copy> Compiled<I> {
    fn new(term: &Term, lookup: &impl Fn(TypeKey) -> Option<I>) -> Self {
        match term {
            Term::Read(key) | Term::Present(key) => Compiled::Present(lookup(*key)),
            Term::Absent(key) => Compiled::Absent(lookup(*key)),
            Term::Added(key) => Compiled::Added(lookup(*key)),
            Term::Changed(key) => Compiled::Changed(lookup(*key)),
            Term::Removed(key) => Compiled::Removed(lookup(*key)),
            Term::Optional(_) => Compiled::Always,
            Term::Any(children) => {
                Compiled::Any(children.iter().map(|child| Compiled::new(child, lookup)).collect())
            }
        }
    }

    /// Identity this term requires to be present, if any
    fn required(&self) -> Option<Option<I>> {
        match self {
            Compiled::Present(id) | Compiled::Added(id) | Compiled::Changed(id) => Some(*id),
            _ => None,
        }
    }

    fn matches<P: Probe<Id = I>>(&self, probe: &P, since: u64) -> bool {
        match self {
            Compiled::Present(id) => id.map_or(false, |id| probe.present(id)),
            Compiled::Absent(id) => id.map_or(true, |id| !probe.present(id)),
            Compiled::Added(id) => id
                .and_then(|id| probe.ticks(id))
                .map_or(false, |ticks| ticks.is_added_since(since)),
            Compiled::Changed(id) => id
                .and_then(|id| probe.ticks(id))
                .map_or(false, |ticks| ticks.is_changed_since(since)),
            Compiled::Removed(id) => id.map_or(false, |id| {
                !probe.present(id)
                    && probe
                        .removal(id)
                        .map_or(false, |record| record.is_removed_since(since))
            }),
            Compiled::Always => true,
            Compiled::Any(children) => children.iter().any(|child| child.matches(probe, since)),
        }
    }
}

fn resolve_entities(world: &World, compiled: &[Compiled<ComponentId>], since: u64) -> Vec<Entity> {
    // Narrow the candidates to the smallest store of a required type.
    let mut seed: Option<(usize, ComponentId)> = None;
    for required in compiled.iter().filter_map(Compiled::required) {
        let Some(id) = required else {
            return Vec::new();
        };
        let len = world.erased_store(id).map_or(0, |store| store.len());
        if seed.map_or(true, |(best, _)| len < best) {
            seed = Some((len, id));
        }
    }

    let candidates: Vec<Entity> = match seed.and_then(|(_, id)| world.erased_store(id)) {
        Some(store) => {
            let mut entities = store.entities();
            entities.sort_by_key(|entity| world.directory().creation_seq(*entity));
            entities
        }
        None => world.entities().collect(),
    };

    candidates
        .into_iter()
        .filter(|entity| {
            let probe = EntityProbe {
                world,
                entity: *entity,
            };
            compiled.iter().all(|term| term.matches(&probe, since))
        })
        .collect()
}

fn resources_match(resources: &Resources, compiled: &[Compiled<ResourceId>], since: u64) -> bool {
    let probe = ResourceProbe(resources);
    compiled.iter().all(|term| term.matches(&probe, since))
}

fn compile_components(world: &World, terms: &[Term]) -> Vec<Compiled<ComponentId>> {
    let lookup = |key: TypeKey| world.component_id_of(key);
    terms.iter().map(|term| Compiled::new(term, &lookup)).collect()
}

fn compile_resources(resources: &Resources, terms: &[Term]) -> Vec<Compiled<ResourceId>> {
    let lookup = |key: TypeKey| resources.registry().get(key.type_id());
    terms.iter().map(|term| Compiled::new(term, &lookup)).collect()
}

/// Terms of a [`QueryState`] compiled against one world
///
/// Identities are only ever added to a world, so the compiled form stays
/// valid until one of the registries grows.
#[derive(Debug, Default)]
struct CompiledTerms {
    /// Component and resource registry sizes at compile time
    stamp: Option<(usize, usize)>,
    keys: Vec<Vec<Compiled<ComponentId>>>,
    gate: Vec<Compiled<ResourceId>>,
}

impl CompiledTerms {
    fn refresh(&mut self, spec: &QuerySpec, world: &World) {
        let stamp = (
            world.component_registry().len(),
            world.resources().registry().len(),
        );
        if self.stamp == Some(stamp) {
            return;
        }
        self.keys = spec
            .keys
            .iter()
            .map(|(_, terms)| compile_components(world, terms))
            .collect();
        self.gate = spec
            .resource_terms()
            .map(|terms| compile_resources(world.resources(), terms))
            .unwrap_or_default();
        self.stamp = Some(stamp);
    }
}

/// Validated query with per-key checkpoints
#[derive(Debug)]
pub struct QueryState {
    spec: QuerySpec,
    world: Option<WorldId>,
    checkpoints: Vec<u64>,
    resource_checkpoint: u64,
    compiled: CompiledTerms,
}

impl QueryState {
    /// Validate `spec`
    ///
    /// # Errors
    ///
    /// [`EcsError::ReservedKey`] if `resources` or `command` is used as an
    /// ordinary key, [`EcsError::DuplicateKey`] if a key repeats.
    pub fn new(spec: QuerySpec) -> Result<Self> {
        spec.validate()?;
        let checkpoints = vec![0; spec.keys.len()];
        Ok(QueryState {
            spec,
            world: None,
            checkpoints,
            resource_checkpoint: 0,
            compiled: CompiledTerms::default(),
        })
    }

    /// The specification this state was built from
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Checkpoint of `key`: the tick of its last resolution
    pub fn checkpoint(&self, key: &str) -> Option<u64> {
        let index = self.spec.keys().position(|name| name == key)?;
        Some(self.checkpoints[index])
    }

    pub(crate) fn bind(&mut self, world: WorldId) {
        if self.world != Some(world) {
            self.world = Some(world);
            self.checkpoints.iter_mut().for_each(|checkpoint| *checkpoint = 0);
            self.resource_checkpoint = 0;
            self.compiled = CompiledTerms::default();
        }
    }

    /// Whether the `resources` gate currently passes
    pub fn resources_satisfied(&self, world: &World) -> bool {
        match self.spec.resource_terms() {
            Some(terms) => resources_match(
                world.resources(),
                &compile_resources(world.resources(), terms),
                self.resource_checkpoint,
            ),
            None => true,
        }
    }

    /// Resolve every key against `world`
    ///
    /// Returns `None`, leaving every checkpoint untouched, when the
    /// `resources` gate does not pass. Otherwise each key's checkpoint moves
    /// to the current tick and the world tick advances, so mutations made
    /// after this call are newer than the checkpoint.
    pub fn resolve(&mut self, world: &mut World) -> Option<ResolvedQuery> {
        self.bind(world.id());
        self.compiled.refresh(&self.spec, world);
        if !resources_match(world.resources(), &self.compiled.gate, self.resource_checkpoint) {
            return None;
        }

        let tick = world.change_tick();
        if self.spec.resources.is_some() {
            self.resource_checkpoint = tick;
        }

        let mut views = Vec::with_capacity(self.spec.keys.len());
        let keys = self.spec.keys.iter().zip(&self.compiled.keys);
        for (((key, terms), compiled), checkpoint) in keys.zip(self.checkpoints.iter_mut()) {
            let entities = resolve_entities(world, compiled, *checkpoint);
            *checkpoint = tick;
            views.push(QueryView {
                key: key.clone(),
                entities,
                extracted: terms.iter().filter_map(Term::extracted).collect(),
            });
        }

        world.advance_tick();
        Some(ResolvedQuery {
            views,
            commands: self.spec.commands,
        })
    }
}

/// Result of one resolution
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    views: Vec<QueryView>,
    commands: bool,
}

impl ResolvedQuery {
    /// Matches of one key
    pub fn view(&self, key: &str) -> Result<&QueryView> {
        self.views
            .iter()
            .find(|view| view.key == key)
            .ok_or_else(|| EcsError::UnknownKey(key.to_string()))
    }

    /// Matches of every key, in declaration order
    pub fn views(&self) -> &[QueryView] {
        &self.views
    }

    /// Whether the `command` key was declared
    pub fn grants_commands(&self) -> bool {
        self.commands
    }
}

/// Entities matched by one key
#[derive(Debug, Clone)]
pub struct QueryView {
    key: String,
    entities: Vec<Entity>,
    extracted: Vec<(TypeKey, bool)>,
}

impl QueryView {
    /// Name of the key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Matched entities in creation order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Iterate matched entities in creation order
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().copied()
    }

    /// Number of matches
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if nothing matched
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check whether `entity` matched
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    /// The only match
    ///
    /// # Errors
    ///
    /// [`EcsError::NotExactlyOne`] when zero or several entities matched.
    pub fn single(&self) -> Result<Entity> {
        match self.entities.as_slice() {
            [entity] => Ok(*entity),
            entities => Err(EcsError::NotExactlyOne {
                key: self.key.clone(),
                count: entities.len(),
            }),
        }
    }

    /// Types whose values this key extracts, in term order
    pub fn extracted(&self) -> &[(TypeKey, bool)] {
        &self.extracted
    }

    /// Borrow the stores needed to read the extracted values as `Q`
    ///
    /// `Q` must list the extracted types in term order: `&T` or `&mut T` for
    /// a bare type, `Option<&T>` or `Option<&mut T>` for an optional one.
    pub fn fetch<'w, Q: Fetch>(&self, world: &'w World) -> Result<QueryFetch<'w, '_, Q>> {
        let mut requested = Vec::new();
        Q::extracted(&mut requested);
        if requested != self.extracted {
            return Err(EcsError::FetchMismatch {
                key: self.key.clone(),
                declared: short_names(&self.extracted),
                requested: short_names(&requested),
            });
        }
        Ok(QueryFetch {
            borrow: Q::borrow(world)?,
            world,
            view: self,
            tick: world.change_tick(),
        })
    }
}

fn short_names(keys: &[(TypeKey, bool)]) -> Vec<&'static str> {
    keys.iter().map(|(key, _)| key.short_name()).collect()
}

/// Typed access to component values of matched entities
///
/// Implemented for `&T`, `&mut T` (yielding a change-tracking [`Mut`]),
/// `Option<&T>`, `Option<&mut T>` and tuples of up to eight of those.
pub trait Fetch {
    /// Store borrows held while fetching
    type Borrow<'w>;
    /// Value produced for one entity
    type Item<'b>;

    /// Push the extracted types in order
    fn extracted(out: &mut Vec<(TypeKey, bool)>);

    /// Borrow the stores from `world`
    fn borrow(world: &World) -> Result<Self::Borrow<'_>>;

    /// Read the values of `entity`, or `None` if a required one is missing
    fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, tick: u64) -> Option<Self::Item<'b>>;
}

fn conflict<T: 'static>() -> EcsError {
    EcsError::BorrowConflict {
        type_name: TypeKey::of::<T>().short_name(),
    }
}

fn borrow_store<T: Component>(world: &World) -> Result<Option<Ref<'_, ComponentStore<T>>>> {
    world
        .store_of::<T>()
        .map(|cell: &RefCell<ComponentStore<T>>| cell.try_borrow().map_err(|_| conflict::<T>()))
        .transpose()
}

fn borrow_store_mut<T: Component>(world: &World) -> Result<Option<RefMut<'_, ComponentStore<T>>>> {
    world
        .store_of::<T>()
        .map(|cell| cell.try_borrow_mut().map_err(|_| conflict::<T>()))
        .transpose()
}

impl<'a, T: Component> Fetch for &'a T {
    type Borrow<'w> = Option<Ref<'w, ComponentStore<T>>>;
    type Item<'b> = &'b T;

    fn extracted(out: &mut Vec<(TypeKey, bool)>) {
        out.push((TypeKey::of::<T>(), false));
    }

    fn borrow(world: &World) -> Result<Self::Borrow<'_>> {
        borrow_store::<T>(world)
    }

    fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, _tick: u64) -> Option<&'b T> {
        borrow.as_ref()?.get(entity)
    }
}

impl<'a, T: Component> Fetch for &'a mut T {
    type Borrow<'w> = Option<RefMut<'w, ComponentStore<T>>>;
    type Item<'b> = Mut<'b, T>;

    fn extracted(out: &mut Vec<(TypeKey, bool)>) {
        out.push((TypeKey::of::<T>(), false));
    }

    fn borrow(world: &World) -> Result<Self::Borrow<'_>> {
        borrow_store_mut::<T>(world)
    }

    fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, tick: u64) -> Option<Mut<'b, T>> {
        let (value, ticks) = borrow.as_mut()?.get_mut_with_ticks(entity)?;
        Some(Mut::new(value, ticks, tick))
    }
}

impl<'a, T: Component> Fetch for Option<&'a T> {
    type Borrow<'w> = Option<Ref<'w, ComponentStore<T>>>;
    type Item<'b> = Option<&'b T>;

    fn extracted(out: &mut Vec<(TypeKey, bool)>) {
        out.push((TypeKey::of::<T>(), true));
    }

    fn borrow(world: &World) -> Result<Self::Borrow<'_>> {
        borrow_store::<T>(world)
    }

    fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, _tick: u64) -> Option<Option<&'b T>> {
        Some(borrow.as_ref().and_then(|store| store.get(entity)))
    }
}

impl<'a, T: Component> Fetch for Option<&'a mut T> {
    type Borrow<'w> = Option<RefMut<'w, ComponentStore<T>>>;
    type Item<'b> = Option<Mut<'b, T>>;

    fn extracted(out: &mut Vec<(TypeKey, bool)>) {
        out.push((TypeKey::of::<T>(), true));
    }

    fn borrow(world: &World) -> Result<Self::Borrow<'_>> {
        borrow_store_mut::<T>(world)
    }

    fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, tick: u64) -> Option<Option<Mut<'b, T>>> {
        Some(
            borrow
                .as_mut()
                .and_then(|store| store.get_mut_with_ticks(entity))
                .map(|(value, ticks)| Mut::new(value, ticks, tick)),
        )
    }
}

macro_rules! tuple_fetch {
    ($($name:ident $var:ident),+) => {
        impl<$($name: Fetch),+> Fetch for ($($name,)+) {
            type Borrow<'w> = ($($name::Borrow<'w>,)+);
            type Item<'b> = ($($name::Item<'b>,)+);

            fn extracted(out: &mut Vec<(TypeKey, bool)>) {
                $($name::extracted(out);)+
            }

            fn borrow(world: &World) -> Result<Self::Borrow<'_>> {
                Ok(($($name::borrow(world)?,)+))
            }

            fn fetch<'b>(borrow: &'b mut Self::Borrow<'_>, entity: Entity, tick: u64) -> Option<Self::Item<'b>> {
                let ($($var,)+) = borrow;
                Some(($($name::fetch($var, entity, tick)?,)+))
            }
        }
    };
}

tuple_fetch!(A a);
tuple_fetch!(A a, B b);
tuple_fetch!(A a, B b, C c);
tuple_fetch!(A a, B b, C c, D d);
tuple_fetch!(A a, B b, C c, D d, E e);
tuple_fetch!(A a, B b, C c, D d, E e, F f);
tuple_fetch!(A a, B b, C c, D d, E e, F f, G g);
tuple_fetch!(A a, B b, C c, D d, E e, F f, G g, H h);

/// Borrowed stores for reading the values of one [`QueryView`]
///
/// Values are handed out one entity at a time:
///
/// ```
/// # use ecs_runtime::ecs::{Component, QuerySpec, Term, World};
/// # #[derive(Default)] struct Position { x: f64 }
/// # impl Component for Position {}
/// let mut world = World::new();
/// let entity = world.spawn();
/// world.insert(entity, Position::default())?;
///
/// let mut query = world.query(QuerySpec::new().key("all", [Term::read::<Position>()]))?;
/// let resolved = query.resolve(&mut world).expect("no resource gate");
/// let view = resolved.view("all")?;
/// let mut positions = view.fetch::<&mut Position>(&world)?;
/// for &entity in positions.entities() {
///     positions.get(entity)?.x += 1.0;
/// }
/// # drop(positions);
/// assert_eq!(world.get::<Position>(entity)?.x, 1.0);
/// # Ok::<(), ecs_runtime::EcsError>(())
/// ```
pub struct QueryFetch<'w, 'v, Q: Fetch> {
    borrow: Q::Borrow<'w>,
    world: &'w World,
    view: &'v QueryView,
    tick: u64,
}

impl<'w, 'v, Q: Fetch> QueryFetch<'w, 'v, Q> {
    /// Matched entities in creation order
    pub fn entities(&self) -> &'v [Entity] {
        let view: &'v QueryView = self.view;
        &view.entities
    }

    /// The view being read
    pub fn view(&self) -> &'v QueryView {
        self.view
    }

    /// Values of `entity`
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if the entity lacks a required type.
    pub fn get(&mut self, entity: Entity) -> Result<Q::Item<'_>> {
        let (world, view, tick) = (self.world, self.view, self.tick);
        Q::fetch(&mut self.borrow, entity, tick).ok_or_else(|| missing(world, view, entity))
    }

    /// Values of the only match
    pub fn single(&mut self) -> Result<Q::Item<'_>> {
        let entity = self.view.single()?;
        self.get(entity)
    }

    /// The only match together with its values
    pub fn single_with_entity(&mut self) -> Result<(Entity, Q::Item<'_>)> {
        let entity = self.view.single()?;
        let item = self.get(entity)?;
        Ok((entity, item))
    }
}

fn missing(world: &World, view: &QueryView, entity: Entity) -> EcsError {
    if !world.is_alive(entity) {
        return EcsError::DeadEntity(entity);
    }
    let component = view
        .extracted
        .iter()
        .filter(|(_, optional)| !optional)
        .map(|(key, _)| *key)
        .find(|key| {
            world
                .component_id_of(*key)
                .map_or(true, |id| !world.directory().has(entity, id))
        })
        .map_or("<unknown>", |key| key.short_name());
    EcsError::MissingComponent { entity, component }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Position {
        x: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Default)]
    struct Velocity {
        x: f32,
    }
    impl Component for Velocity {}

    struct Renderable;
    impl Component for Renderable {}

    struct Gravity;
    impl crate::ecs::Resource for Gravity {}

    fn resolve(state: &mut QueryState, world: &mut World, key: &str) -> Vec<Entity> {
        let resolved = state.resolve(world).expect("gate passes");
        resolved.view(key).unwrap().entities().to_vec()
    }

    #[test]
    fn test_reserved_and_duplicate_keys() {
        let err = QueryState::new(QuerySpec::new().key("resources", [Term::read::<Position>()]))
            .unwrap_err();
        assert!(matches!(err, EcsError::ReservedKey(ref key) if key == "resources"));

        let err = QueryState::new(QuerySpec::new().key("command", Vec::new())).unwrap_err();
        assert!(matches!(err, EcsError::ReservedKey(_)));

        let err = QueryState::new(
            QuerySpec::new()
                .key("a", [Term::read::<Position>()])
                .key("a", [Term::read::<Velocity>()]),
        )
        .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateKey(_)));
    }

    #[test]
    fn test_or_composition() {
        let mut world = World::new();
        let moving = world.spawn_bundle((Position::default(), Velocity::default()));
        let hidden = world.spawn_bundle((Position::default(),));
        let drawn = world.spawn_bundle((Position::default(), Renderable));

        let mut state = world
            .query(QuerySpec::new().key(
                "items",
                [
                    Term::read::<Position>(),
                    Term::present::<Velocity>().or(Term::absent::<Renderable>()),
                ],
            ))
            .unwrap();

        let matched = resolve(&mut state, &mut world, "items");
        assert_eq!(matched, vec![moving, hidden]);
        assert!(!matched.contains(&drawn));
    }

    #[test]
    fn test_results_follow_creation_order() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        let c = world.spawn();
        // Attach in reverse so store order differs from creation order.
        world.insert(c, Position::default()).unwrap();
        world.insert(b, Position::default()).unwrap();
        world.insert(a, Position::default()).unwrap();

        let mut state = world
            .query(QuerySpec::new().key("p", [Term::read::<Position>()]))
            .unwrap();
        assert_eq!(resolve(&mut state, &mut world, "p"), vec![a, b, c]);
    }

    #[test]
    fn test_added_matches_once_per_query() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(),));

        let spec = QuerySpec::new().key("new", [Term::added::<Position>()]);
        let mut first = world.query(spec.clone()).unwrap();
        let mut second = world.query(spec).unwrap();

        assert_eq!(resolve(&mut first, &mut world, "new"), vec![entity]);
        assert!(resolve(&mut first, &mut world, "new").is_empty());
        // The other query has its own checkpoint.
        assert_eq!(resolve(&mut second, &mut world, "new"), vec![entity]);
        assert!(resolve(&mut second, &mut world, "new").is_empty());
    }

    #[test]
    fn test_changed_matches_after_mutation() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(),));
        let mut state = world
            .query(QuerySpec::new().key("dirty", [Term::changed::<Position>()]))
            .unwrap();

        assert_eq!(resolve(&mut state, &mut world, "dirty"), vec![entity]);
        assert!(resolve(&mut state, &mut world, "dirty").is_empty());

        world.get_mut::<Position>(entity).unwrap().x = 2.0;
        assert_eq!(resolve(&mut state, &mut world, "dirty"), vec![entity]);
        assert!(resolve(&mut state, &mut world, "dirty").is_empty());
    }

    #[test]
    fn test_reading_does_not_count_as_change() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(),));
        let mut state = world
            .query(QuerySpec::new().key("dirty", [Term::changed::<Position>()]))
            .unwrap();
        resolve(&mut state, &mut world, "dirty");

        let x = world.get_mut::<Position>(entity).unwrap().x;
        assert_eq!(x, 0.0);
        assert!(resolve(&mut state, &mut world, "dirty").is_empty());
    }

    #[test]
    fn test_replacing_counts_as_changed_not_added() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(),));
        let mut state = world
            .query(
                QuerySpec::new()
                    .key("added", [Term::added::<Position>()])
                    .key("changed", [Term::changed::<Position>()]),
            )
            .unwrap();
        state.resolve(&mut world).unwrap();

        world.insert(entity, Position { x: 5.0 }).unwrap();
        let resolved = state.resolve(&mut world).unwrap();
        assert!(resolved.view("added").unwrap().is_empty());
        assert_eq!(resolved.view("changed").unwrap().entities(), &[entity]);
    }

    #[test]
    fn test_removed_matches_once() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(), Velocity::default()));
        let mut state = world
            .query(QuerySpec::new().key("stopped", [Term::read::<Position>(), Term::removed::<Velocity>()]))
            .unwrap();
        assert!(resolve(&mut state, &mut world, "stopped").is_empty());

        world.remove_component::<Velocity>(entity);
        assert_eq!(resolve(&mut state, &mut world, "stopped"), vec![entity]);
        assert!(resolve(&mut state, &mut world, "stopped").is_empty());
    }

    #[test]
    fn test_removed_requires_presence_at_checkpoint() {
        let mut world = World::new();
        let mut state = world
            .query(QuerySpec::new().key("gone", [Term::removed::<Velocity>()]))
            .unwrap();
        state.resolve(&mut world).unwrap();

        // Added and removed between two resolutions: never observed.
        let entity = world.spawn_bundle((Velocity::default(),));
        world.remove_component::<Velocity>(entity);
        assert!(resolve(&mut state, &mut world, "gone").is_empty());
    }

    #[test]
    fn test_optional_never_filters() {
        let mut world = World::new();
        let with = world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 }));
        let without = world.spawn_bundle((Position { x: 3.0 },));

        let mut state = world
            .query(QuerySpec::new().key("p", [Term::read::<Position>(), Term::optional::<Velocity>()]))
            .unwrap();
        let resolved = state.resolve(&mut world).unwrap();
        let view = resolved.view("p").unwrap();
        assert_eq!(view.entities(), &[with, without]);

        let mut fetch = view.fetch::<(&Position, Option<&Velocity>)>(&world).unwrap();
        let (position, velocity) = fetch.get(with).unwrap();
        assert_eq!(position.x, 1.0);
        assert_eq!(velocity.map(|v| v.x), Some(2.0));
        let (position, velocity) = fetch.get(without).unwrap();
        assert_eq!(position.x, 3.0);
        assert!(velocity.is_none());
    }

    #[test]
    fn test_fetch_must_follow_term_order() {
        let mut world = World::new();
        world.spawn_bundle((Position::default(), Velocity::default()));
        let mut state = world
            .query(QuerySpec::new().key("m", [Term::read::<Position>(), Term::read::<Velocity>()]))
            .unwrap();
        let resolved = state.resolve(&mut world).unwrap();
        let view = resolved.view("m").unwrap();

        assert!(view.fetch::<(&Position, &Velocity)>(&world).is_ok());
        let err = view.fetch::<(&Velocity, &Position)>(&world).err().unwrap();
        assert!(matches!(err, EcsError::FetchMismatch { .. }));
    }

    #[test]
    fn test_fetch_mut_marks_changed() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position::default(),));
        let mut movers = world
            .query(QuerySpec::new().key("all", [Term::read::<Position>()]))
            .unwrap();
        let mut watcher = world
            .query(QuerySpec::new().key("dirty", [Term::changed::<Position>()]))
            .unwrap();
        resolve(&mut watcher, &mut world, "dirty");

        let resolved = movers.resolve(&mut world).unwrap();
        {
            let mut fetch = resolved.view("all").unwrap().fetch::<&mut Position>(&world).unwrap();
            fetch.single().unwrap().x += 1.0;
        }
        assert_eq!(world.get::<Position>(entity).unwrap().x, 1.0);
        assert_eq!(resolve(&mut watcher, &mut world, "dirty"), vec![entity]);
    }

    #[test]
    fn test_conflicting_fetch_is_an_error() {
        let mut world = World::new();
        world.spawn_bundle((Position::default(),));
        let mut state = world
            .query(QuerySpec::new().key("all", [Term::read::<Position>()]))
            .unwrap();
        let resolved = state.resolve(&mut world).unwrap();
        let view = resolved.view("all").unwrap();

        let _writer = view.fetch::<&mut Position>(&world).unwrap();
        let err = view.fetch::<&Position>(&world).err().unwrap();
        assert!(matches!(err, EcsError::BorrowConflict { type_name: "Position" }));
    }

    #[test]
    fn test_single_requires_exactly_one() {
        let mut world = World::new();
        let mut state = world
            .query(QuerySpec::new().key("p", [Term::read::<Position>()]))
            .unwrap();

        let resolved = state.resolve(&mut world).unwrap();
        let err = resolved.view("p").unwrap().single().unwrap_err();
        assert!(matches!(err, EcsError::NotExactlyOne { count: 0, .. }));

        let entity = world.spawn_bundle((Position { x: 7.0 },));
        let resolved = state.resolve(&mut world).unwrap();
        let view = resolved.view("p").unwrap();
        let mut fetch = view.fetch::<&Position>(&world).unwrap();
        let (found, position) = fetch.single_with_entity().unwrap();
        assert_eq!(found, entity);
        assert_eq!(position.x, 7.0);
    }

    #[test]
    fn test_resource_gate() {
        let mut world = World::new();
        let mut state = world
            .query(
                QuerySpec::new()
                    .key("p", [Term::read::<Position>()])
                    .resources([Term::read::<Gravity>()]),
            )
            .unwrap();

        let tick = world.change_tick();
        assert!(state.resolve(&mut world).is_none());
        assert_eq!(world.change_tick(), tick);

        world.resources_mut().add_new(Gravity);
        assert!(state.resolve(&mut world).is_some());
    }

    #[test]
    fn test_types_registered_after_first_resolve_are_seen() {
        let mut world = World::new();
        let plain = world.spawn_bundle((Position::default(),));
        let mut state = world
            .query(
                QuerySpec::new()
                    .key("p", [Term::read::<Position>(), Term::absent::<Renderable>()])
                    .key("v", [Term::read::<Velocity>()]),
            )
            .unwrap();
        assert_eq!(resolve(&mut state, &mut world, "p"), vec![plain]);

        let drawn = world.spawn_bundle((Position::default(), Renderable));
        let moving = world.spawn_bundle((Velocity::default(),));
        let resolved = state.resolve(&mut world).unwrap();
        assert_eq!(resolved.view("p").unwrap().entities(), &[plain]);
        assert!(!resolved.view("p").unwrap().contains(drawn));
        assert_eq!(resolved.view("v").unwrap().entities(), &[moving]);
    }

    #[test]
    fn test_unknown_key() {
        let mut world = World::new();
        let mut state = world.query(QuerySpec::new().key("p", [Term::read::<Position>()])).unwrap();
        let resolved = state.resolve(&mut world).unwrap();
        assert!(matches!(resolved.view("q"), Err(EcsError::UnknownKey(_))));
    }

    #[test]
    fn test_state_resets_when_used_on_another_world() {
        let mut first = World::new();
        first.spawn_bundle((Position::default(),));
        let mut state = first
            .query(QuerySpec::new().key("new", [Term::added::<Position>()]))
            .unwrap();
        assert_eq!(resolve(&mut state, &mut first, "new").len(), 1);

        let mut second = World::new();
        second.spawn_bundle((Position::default(),));
        assert_eq!(resolve(&mut state, &mut second, "new").len(), 1);
    }
}
