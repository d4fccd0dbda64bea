use super::StateManager;
use super::assets::{AssetLoader, GateStatus, check_gate, wait_gate};
use crate::archive::{StateReader, StateWriter};
use crate::core::{AssetPath, ManagerScope, NodeHandle, NodeKind, PersistError, Result};
use crate::identity::ObjectId;
use crate::state::{ActorState, LevelState, LoadContext, PersistContext, SaveContext};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{Level, event, info_span};

pub const LEVEL_ACTORS_TAG: &str = "LevelActors";

/// Result of the synchronous part of a level load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelLoadStatus {
    Completed,
    /// Static actors are linked; dynamic recreation waits for these assets
    AwaitingAssets(Vec<AssetPath>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelActorsStats {
    pub levels: usize,
    pub actors: usize,
    pub components: usize,
    pub dependencies: usize,
    pub destroyed: usize,
    pub outdated: usize,
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Discovering,
    Loading,
    Recreating,
}

#[derive(Debug, Clone, Copy, Default)]
struct PassGuards {
    discovering: bool,
    loading: bool,
    recreating: bool,
}

impl PassGuards {
    fn flag(&mut self, pass: Pass) -> &mut bool {
        match pass {
            Pass::Discovering => &mut self.discovering,
            Pass::Loading => &mut self.loading,
            Pass::Recreating => &mut self.recreating,
        }
    }
}

// ============================================================================
// Level Actors Manager
// ============================================================================

/// Owns the actor records of every level and runs the level pipeline:
/// discover and link static actors, wait for the asset gate, recreate dynamic actors,
/// then load every linked record parent-first.
pub struct LevelActorsManager {
    levels: BTreeMap<ObjectId, LevelState>,
    /// Static actors removed at runtime; destroyed again whenever their level is discovered
    destroyed: BTreeSet<ObjectId>,
    /// Records dropped because their class or content disappeared
    outdated: BTreeSet<ObjectId>,
    guards: PassGuards,
    queued: VecDeque<NodeHandle>,
    /// Levels that finished discovery and wait for their assets
    pending_loads: BTreeMap<ObjectId, LoadContext>,
    /// Nodes initialized inside a level that waits for assets; handled once its load completes
    deferred: BTreeMap<ObjectId, Vec<NodeHandle>>,
    /// Nodes destroyed by the manager itself; their destroy notifications are ignored
    self_destroyed: HashSet<NodeHandle>,
    loader: Arc<dyn AssetLoader>,
}

impl std::fmt::Debug for LevelActorsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelActorsManager")
            .field("levels", &self.levels.len())
            .field("destroyed", &self.destroyed.len())
            .field("outdated", &self.outdated.len())
            .field("queued", &self.queued.len())
            .field("deferred", &self.deferred.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl LevelActorsManager {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            levels: BTreeMap::new(),
            destroyed: BTreeSet::new(),
            outdated: BTreeSet::new(),
            guards: PassGuards::default(),
            queued: VecDeque::new(),
            pending_loads: BTreeMap::new(),
            deferred: BTreeMap::new(),
            self_destroyed: HashSet::new(),
            loader,
        }
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn is_discovering(&self) -> bool {
        self.guards.discovering
    }

    pub fn is_loading(&self) -> bool {
        self.guards.loading
    }

    pub fn is_recreating(&self) -> bool {
        self.guards.recreating
    }

    /// New nodes are queued instead of processed while this holds
    pub fn is_busy(&self) -> bool {
        self.guards.discovering || self.guards.loading || self.guards.recreating
    }

    pub fn level(&self, id: &ObjectId) -> Option<&LevelState> {
        self.levels.get(id)
    }

    pub fn level_mut(&mut self, id: &ObjectId) -> Option<&mut LevelState> {
        self.levels.get_mut(id)
    }

    pub fn levels(&self) -> impl Iterator<Item = &LevelState> {
        self.levels.values()
    }

    /// Actor record by id, searched across all levels
    pub fn actor(&self, id: &ObjectId) -> Option<&ActorState> {
        self.levels.values().find_map(|level| level.actor(id))
    }

    pub fn destroyed(&self) -> &BTreeSet<ObjectId> {
        &self.destroyed
    }

    pub fn outdated(&self) -> &BTreeSet<ObjectId> {
        &self.outdated
    }

    pub fn is_awaiting_assets(&self, level_id: &ObjectId) -> bool {
        self.pending_loads.contains_key(level_id)
    }

    pub fn stats(&self) -> LevelActorsStats {
        LevelActorsStats {
            levels: self.levels.len(),
            actors: self.levels.values().map(|l| l.actors.len()).sum(),
            components: self.levels.values().map(LevelState::component_count).sum(),
            dependencies: self.levels.values().map(|l| l.dependencies.len()).sum(),
            destroyed: self.destroyed.len(),
            outdated: self.outdated.len(),
        }
    }

    fn with_pass<T>(&mut self, pass: Pass, run: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        *self.guards.flag(pass) = true;
        let result = run(self);
        *self.guards.flag(pass) = false;
        result
    }

    fn level_id(ctx: &mut PersistContext<'_>, level: NodeHandle) -> Result<ObjectId> {
        let id = ctx.registry.create_static(&*ctx.host, level)?;
        if !id.is_valid() {
            return Err(PersistError::InvalidState(format!("level {} has no stable path", level)));
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // level pipeline
    // ------------------------------------------------------------------

    /// Discover and link the level's static actors, then either finish the load or
    /// report the assets dynamic recreation must wait for.
    pub fn initialize_level(
        &mut self,
        ctx: &mut PersistContext<'_>,
        level: NodeHandle,
        from_level_streaming: bool,
    ) -> Result<LevelLoadStatus> {
        if ctx.host.kind(level) != Some(NodeKind::Level) {
            return Err(PersistError::InvalidState(format!("node {} is not a live level", level)));
        }
        let level_id = Self::level_id(ctx, level)?;
        let span = info_span!("persist.level.load", level = %level_id.describe(), streaming = from_level_streaming);
        let _enter = span.enter();

        let state = self
            .levels
            .entry(level_id.clone())
            .or_insert_with(|| LevelState::new(level_id.clone()));
        if state.flags.initialized {
            return Err(PersistError::InvalidState(format!(
                "level {} is already initialized",
                level_id.describe()
            )));
        }
        state.flags.initialized = true;
        state.flags.added = !from_level_streaming;
        state.flags.streaming = from_level_streaming;
        state.set_node(Some(level));

        let mut load = LoadContext::default();
        self.with_pass(Pass::Discovering, |this| this.discover(ctx, &level_id, level, &mut load))?;

        let status = match self.levels.get(&level_id) {
            Some(state) => check_gate(self.loader.as_ref(), &state.dependencies),
            None => GateStatus::Ready,
        };
        match status {
            GateStatus::Ready => {
                self.complete_level(ctx, &level_id, load)?;
                Ok(LevelLoadStatus::Completed)
            }
            GateStatus::Pending(missing) => {
                event!(Level::DEBUG, assets = missing.len(), "Level waits for assets");
                self.pending_loads.insert(level_id, load);
                Ok(LevelLoadStatus::AwaitingAssets(missing))
            }
        }
    }

    /// Second half of a load that reported [`LevelLoadStatus::AwaitingAssets`]
    pub fn finish_level_load(&mut self, ctx: &mut PersistContext<'_>, level: NodeHandle) -> Result<()> {
        let level_id = Self::level_id(ctx, level)?;
        let Some(load) = self.pending_loads.remove(&level_id) else {
            return Err(PersistError::InvalidState(format!(
                "level {} is not waiting for assets",
                level_id.describe()
            )));
        };
        let span = info_span!("persist.level.load", level = %level_id.describe());
        let _enter = span.enter();
        // drained after the Load pass
        if let Some(nodes) = self.deferred.remove(&level_id) {
            self.queued.extend(nodes);
        }
        self.complete_level(ctx, &level_id, load)
    }

    /// Full level load, suspending on the asset gate when dependencies are missing
    pub async fn load_level(
        &mut self,
        ctx: &mut PersistContext<'_>,
        level: NodeHandle,
        from_level_streaming: bool,
    ) -> Result<()> {
        match self.initialize_level(ctx, level, from_level_streaming)? {
            LevelLoadStatus::Completed => Ok(()),
            LevelLoadStatus::AwaitingAssets(missing) => {
                let loader = Arc::clone(&self.loader);
                wait_gate(loader.as_ref(), missing).await;
                self.finish_level_load(ctx, level)
            }
        }
    }

    /// A streamed level became visible; from now on it takes part in world saves
    pub fn notify_level_added(&mut self, ctx: &mut PersistContext<'_>, level: NodeHandle) {
        let Some(level_id) = ctx.registry.find(level) else {
            return;
        };
        match self.levels.get_mut(&level_id) {
            Some(state) if state.flags.initialized => state.flags.added = true,
            _ => event!(Level::WARN, level = %level_id.describe(), "Level added before it was initialized"),
        }
    }

    /// Save a level leaving the world and unlink its records.
    /// The records are unlinked even when the save fails.
    pub fn remove_level(&mut self, ctx: &mut PersistContext<'_>, level: NodeHandle) -> Result<()> {
        let Some(level_id) = ctx.registry.find(level) else {
            return Ok(());
        };
        self.pending_loads.remove(&level_id);
        self.deferred.remove(&level_id);
        let initialized = self.levels.get(&level_id).is_some_and(|s| s.flags.initialized);
        let saved = if initialized {
            self.save_level(ctx, &level_id, true)
        } else {
            Ok(())
        };
        if let Some(state) = self.levels.get_mut(&level_id) {
            self.loader.release_assets(state.dependencies.paths());
            state.reset_links();
        }
        if let Err(err) = &saved {
            event!(Level::WARN, level = %level_id.describe(), error = %err, "Level removed without a complete save");
        }
        saved
    }

    fn discover(
        &mut self,
        ctx: &mut PersistContext<'_>,
        level_id: &ObjectId,
        level: NodeHandle,
        load: &mut LoadContext,
    ) -> Result<()> {
        let Some(state) = self.levels.get_mut(level_id) else {
            return Ok(());
        };
        let mut doomed = Vec::new();
        let mut spawned = Vec::new();

        for actor in ctx.host.level_actors(level) {
            if !ctx.host.is_alive(actor) {
                continue;
            }
            if !ctx.host.implements_persistence(actor) {
                // referenced from saved records, so it still needs an id
                ctx.registry.create_static(&*ctx.host, actor)?;
                continue;
            }

            let id = ctx.registry.create(&*ctx.host, actor)?;
            if id.is_static() && self.destroyed.contains(&id) {
                doomed.push(actor);
                continue;
            }

            let record = state
                .actors
                .entry(id.clone())
                .or_insert_with(|| ActorState::new(id.clone()));
            match record.record.node() {
                Some(node) if node == actor => {}
                Some(node) if ctx.host.is_alive(node) => {
                    return Err(PersistError::InvalidState(format!(
                        "actor record {} is linked to another live node {}",
                        id.describe(),
                        node
                    )));
                }
                Some(_) => {
                    record.unlink();
                    record.record.link(&mut *ctx.host, actor)?;
                }
                None => record.record.link(&mut *ctx.host, actor)?,
            }
            record.initialize_components(ctx, &self.destroyed, load, &mut spawned)?;
        }

        self.queued.extend(spawned);
        for actor in doomed {
            event!(Level::DEBUG, actor = %actor, "Destroying actor removed by an earlier save");
            self.self_destroyed.insert(actor);
            ctx.host.destroy(actor);
        }
        Ok(())
    }

    fn complete_level(&mut self, ctx: &mut PersistContext<'_>, level_id: &ObjectId, mut load: LoadContext) -> Result<()> {
        self.with_pass(Pass::Recreating, |this| this.recreate_dynamic(ctx, level_id, &mut load))?;
        self.prune_orphans(level_id, &mut load);
        self.with_pass(Pass::Loading, |this| this.load_linked(ctx, level_id))?;

        if !load.created_actors.is_empty() || !load.created_components.is_empty() {
            event!(
                Level::DEBUG,
                level = %level_id.describe(),
                actors = load.created_actors.len(),
                components = load.created_components.len(),
                "Recreated dynamic nodes"
            );
        }
        self.outdated.extend(load.outdated);
        self.drain_queue(ctx)
    }

    fn recreate_dynamic(&mut self, ctx: &mut PersistContext<'_>, level_id: &ObjectId, load: &mut LoadContext) -> Result<()> {
        let Some(state) = self.levels.get_mut(level_id) else {
            return Ok(());
        };
        let level = state
            .node()
            .ok_or_else(|| PersistError::RecordNotLinked(level_id.describe()))?;

        // snapshot: recreation may add records through nested construction
        let pending: Vec<ObjectId> = state
            .actors
            .values()
            .filter(|a| a.record.is_dynamic() && !a.record.is_linked())
            .map(|a| a.id().clone())
            .collect();

        let mut spawned = Vec::new();
        for id in pending {
            let Some(actor) = state.actors.get_mut(&id) else {
                continue;
            };
            if actor.record.is_linked() {
                continue;
            }
            if !actor.record.is_saved() {
                state.actors.remove(&id);
                continue;
            }
            if let Some(node) = ctx.registry.resolve(&*ctx.host, &id) {
                actor.record.link(&mut *ctx.host, node)?;
                actor.initialize_components(ctx, &self.destroyed, load, &mut spawned)?;
                continue;
            }
            if !ctx.host.resolve_class(&actor.record.desc.class) {
                event!(
                    Level::WARN,
                    actor = %id.describe(),
                    class = %actor.record.desc.class,
                    "Dropping dynamic actor whose class no longer resolves"
                );
                load.outdated.insert(id.clone());
                state.actors.remove(&id);
                continue;
            }

            actor.record.allocate_dynamic(ctx, level)?;
            actor.initialize_components(ctx, &self.destroyed, load, &mut spawned)?;
            spawned.extend(actor.record.finish_dynamic(ctx)?);
            load.created_actors.push(id);
        }
        self.queued.extend(spawned);
        Ok(())
    }

    /// Static records whose node is no longer part of the content
    fn prune_orphans(&mut self, level_id: &ObjectId, load: &mut LoadContext) {
        let Some(state) = self.levels.get_mut(level_id) else {
            return;
        };
        let orphans: Vec<ObjectId> = state
            .actors
            .values()
            .filter(|a| a.record.is_static() && !a.record.is_linked())
            .map(|a| a.id().clone())
            .collect();
        for id in orphans {
            event!(Level::WARN, actor = %id.describe(), "Dropping static actor record missing from content");
            state.actors.remove(&id);
            load.outdated.insert(id);
        }
    }

    fn load_linked(&mut self, ctx: &mut PersistContext<'_>, level_id: &ObjectId) -> Result<()> {
        let Some(state) = self.levels.get_mut(level_id) else {
            return Ok(());
        };
        for id in state.load_order(&*ctx.host, &*ctx.registry) {
            if let Some(actor) = state.actors.get_mut(&id) {
                if !actor.record.is_initialized() {
                    actor.load(ctx)?;
                }
            }
        }
        Ok(())
    }

    fn drain_queue(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        if self.is_busy() {
            return Ok(());
        }
        while let Some(node) = self.queued.pop_front() {
            self.notify_object_initialized(ctx, node)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // runtime notifications
    // ------------------------------------------------------------------

    /// An actor or component finished construction after its level was discovered
    pub fn notify_object_initialized(&mut self, ctx: &mut PersistContext<'_>, node: NodeHandle) -> Result<()> {
        if self.is_busy() {
            self.queued.push_back(node);
            return Ok(());
        }
        if !ctx.host.is_alive(node) || !ctx.host.implements_persistence(node) {
            return Ok(());
        }
        match ctx.host.kind(node) {
            Some(NodeKind::Actor) => self.on_actor_initialized(ctx, node),
            Some(NodeKind::Component) => self.on_component_initialized(ctx, node),
            _ => Ok(()),
        }
    }

    fn on_actor_initialized(&mut self, ctx: &mut PersistContext<'_>, actor: NodeHandle) -> Result<()> {
        let Some(level_id) = ctx.host.level_of(actor).and_then(|l| ctx.registry.find(l)) else {
            return Ok(());
        };
        if self.defer_if_pending(&level_id, actor) {
            return Ok(());
        }
        let Some(state) = self.levels.get_mut(&level_id) else {
            return Ok(());
        };
        if !state.flags.initialized {
            return Ok(());
        }

        let id = ctx.registry.create(&*ctx.host, actor)?;
        let record = state
            .actors
            .entry(id.clone())
            .or_insert_with(|| ActorState::new(id.clone()));
        match record.record.node() {
            Some(node) if node == actor && record.record.is_initialized() => return Ok(()),
            Some(node) if node == actor => {}
            Some(node) => {
                return Err(PersistError::InvalidState(format!(
                    "actor record {} is linked to {}, cannot link {}",
                    id.describe(),
                    node,
                    actor
                )));
            }
            None => record.record.link(&mut *ctx.host, actor)?,
        }

        let mut load = LoadContext::default();
        let mut spawned = Vec::new();
        self.guards.discovering = true;
        let linked = record.initialize_components(ctx, &self.destroyed, &mut load, &mut spawned);
        self.guards.discovering = false;
        linked?;

        self.guards.loading = true;
        let loaded = record.load(ctx);
        self.guards.loading = false;
        loaded?;

        self.outdated.extend(load.outdated);
        self.queued.extend(spawned);
        self.drain_queue(ctx)
    }

    fn on_component_initialized(&mut self, ctx: &mut PersistContext<'_>, component: NodeHandle) -> Result<()> {
        if ctx.registry.find(component).is_some() {
            return Ok(());
        }
        let Some(actor) = ctx.host.outer(component) else {
            return Ok(());
        };
        let Some(level_id) = ctx.host.level_of(actor).and_then(|l| ctx.registry.find(l)) else {
            return Ok(());
        };
        if self.defer_if_pending(&level_id, component) {
            return Ok(());
        }
        let Some(actor_id) = ctx.registry.find(actor) else {
            return Ok(());
        };
        let Some(actor_state) = self
            .levels
            .get_mut(&level_id)
            .and_then(|state| state.actors.get_mut(&actor_id))
        else {
            return Ok(());
        };
        if !actor_state.record.is_linked() {
            // picked up when the actor links
            return Ok(());
        }

        let id = ctx.registry.create(&*ctx.host, component)?;
        let record = actor_state.find_or_add_component(&id);
        if record.is_linked() {
            return Ok(());
        }
        record.link(&mut *ctx.host, component)?;

        self.guards.loading = true;
        let loaded = record.load(ctx);
        self.guards.loading = false;
        loaded?;
        self.drain_queue(ctx)
    }

    fn defer_if_pending(&mut self, level_id: &ObjectId, node: NodeHandle) -> bool {
        if !self.pending_loads.contains_key(level_id) {
            return false;
        }
        event!(Level::DEBUG, node = %node, level = %level_id.describe(), "Deferring node until the level load completes");
        self.deferred.entry(level_id.clone()).or_default().push(node);
        true
    }

    /// An actor is about to be destroyed at runtime
    pub fn notify_object_destroyed(&mut self, ctx: &mut PersistContext<'_>, node: NodeHandle) {
        if self.self_destroyed.remove(&node) {
            return;
        }
        if ctx.host.kind(node) != Some(NodeKind::Actor) {
            return;
        }
        let Some(id) = ctx.registry.find(node) else {
            return;
        };
        for state in self.levels.values_mut() {
            if state.actors.remove(&id).is_some() {
                if id.is_static() {
                    self.destroyed.insert(id);
                }
                return;
            }
        }
    }

    // ------------------------------------------------------------------
    // save
    // ------------------------------------------------------------------

    /// Save one level. Streaming saves unlink every record afterwards.
    pub fn save_level(&mut self, ctx: &mut PersistContext<'_>, level_id: &ObjectId, from_level_streaming: bool) -> Result<()> {
        let Some(state) = self.levels.get_mut(level_id) else {
            return Ok(());
        };
        let span = info_span!("persist.level.save", level = %level_id.describe(), streaming = from_level_streaming);
        let _enter = span.enter();

        state.dependencies.clear();
        if state.actors.is_empty() {
            return Ok(());
        }
        if !state.flags.initialized {
            return Err(PersistError::InvalidState(format!(
                "level {} saved before initialization",
                level_id.describe()
            )));
        }

        let mut save = SaveContext::new(from_level_streaming);
        let ids: Vec<ObjectId> = state.actors.keys().cloned().collect();
        for id in ids {
            let Some(actor) = state.actors.get_mut(&id) else {
                continue;
            };
            match actor.record.node() {
                Some(node) if ctx.host.is_alive(node) => {
                    actor.save(ctx, &mut save, &mut state.dependencies)?;
                }
                Some(_) => {
                    // destroyed without a notification
                    if actor.record.is_static() {
                        save.destroyed.insert(id.clone());
                    }
                    state.actors.remove(&id);
                }
                None if actor.record.is_static() => {
                    event!(Level::WARN, actor = %id.describe(), "Dropping orphaned static actor record");
                    save.outdated.insert(id.clone());
                    state.actors.remove(&id);
                }
                None => {
                    // not recreated yet; its classes stay level dependencies
                    if actor.record.is_saved() {
                        state.dependencies.track(&actor.record.desc.class);
                    }
                    for component in actor.components.iter().filter(|c| c.is_dynamic() && c.is_saved()) {
                        state.dependencies.track(&component.desc.class);
                    }
                }
            }
        }

        event!(
            Level::DEBUG,
            actors = state.actors.len(),
            dependencies = state.dependencies.len(),
            destroyed = save.destroyed.len(),
            outdated = save.outdated.len(),
            "Level saved"
        );
        self.destroyed.extend(save.destroyed);
        self.outdated.extend(save.outdated);
        Ok(())
    }
}

#[async_trait(?Send)]
impl StateManager for LevelActorsManager {
    fn type_tag(&self) -> &str {
        LEVEL_ACTORS_TAG
    }

    fn scope(&self) -> ManagerScope {
        ManagerScope::World
    }

    /// Saves every level that is both initialized and visible
    fn save_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        self.self_destroyed.retain(|node| ctx.host.is_alive(*node));
        let ready: Vec<ObjectId> = self
            .levels
            .values()
            .filter(|l| l.is_ready())
            .map(|l| l.id.clone())
            .collect();
        for level_id in ready {
            self.save_level(ctx, &level_id, false)?;
        }
        Ok(())
    }

    fn write_chunk(&self, writer: &mut StateWriter) -> Result<()> {
        for set in [&self.destroyed, &self.outdated] {
            writer.raw().write_varint(set.len() as u64)?;
            for id in set {
                writer.write_object_id(id)?;
            }
        }
        writer.raw().write_varint(self.levels.len() as u64)?;
        for level in self.levels.values() {
            level.write(writer)?;
        }
        Ok(())
    }

    fn read_chunk(&mut self, reader: &mut StateReader<Cursor<&[u8]>>) -> Result<()> {
        self.reset();
        for set in [&mut self.destroyed, &mut self.outdated] {
            let count = reader.raw().read_varint()?;
            for _ in 0..count {
                set.insert(reader.read_object_id()?);
            }
        }
        let count = reader.raw().read_varint()?;
        for _ in 0..count {
            let level = LevelState::read(reader)?;
            let level_id = level.id.clone();
            if self.levels.insert(level_id.clone(), level).is_some() {
                return Err(PersistError::Decode(format!("duplicate level {}", level_id.describe())));
            }
        }
        Ok(())
    }

    /// Runs the level pipeline for every level already in the world
    async fn load_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        for level in ctx.host.levels() {
            let level_id = Self::level_id(ctx, level)?;
            if self.levels.get(&level_id).is_some_and(|l| l.flags.initialized) {
                continue;
            }
            self.load_level(ctx, level, false).await?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.levels.clear();
        self.destroyed.clear();
        self.outdated.clear();
        self.queued.clear();
        self.pending_loads.clear();
        self.deferred.clear();
        self.self_destroyed.clear();
        self.guards = PassGuards::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
