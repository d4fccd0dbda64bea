//! In-memory scene graph implementing [`GraphHost`].
//!
//! Nodes live in a generational slab: destroying a node bumps its slot generation, so old
//! handles stop resolving. Paths are built from the outer chain, e.g. `/Game/World.Town.Door`.
//! Used by the test suite and as a reference for hosts embedding the crate.

use crate::core::{
    AssetPath, CustomState, DataLayerState, ManagerScope, NodeHandle, NodeKind, PersistError, Result, Transform,
};
use crate::host::{DataLayerInfo, GraphHost, PersistentObject, PropertyBag, PropertyValue};
use std::collections::HashMap;

// ============================================================================
// Classes
// ============================================================================

/// Blueprint for nodes created through [`GraphHost::allocate`]
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub path: AssetPath,
    pub kind: NodeKind,
    pub has_transform: bool,
    /// Instances expose persistence hooks
    pub persistent: bool,
    /// Name-stable components created with every instance
    pub default_components: Vec<(String, AssetPath)>,
    pub default_properties: PropertyBag,
    /// Actor classes spawned into the same level when construction finishes
    pub spawns: Vec<AssetPath>,
}

impl ClassInfo {
    pub fn actor(path: &str) -> Self {
        Self::of_kind(path, NodeKind::Actor)
    }

    pub fn component(path: &str) -> Self {
        Self::of_kind(path, NodeKind::Component)
    }

    fn of_kind(path: &str, kind: NodeKind) -> Self {
        Self {
            path: AssetPath::new(path),
            kind,
            has_transform: true,
            persistent: true,
            default_components: Vec::new(),
            default_properties: PropertyBag::new(),
            spawns: Vec::new(),
        }
    }

    pub fn with_component(mut self, name: &str, class: &str) -> Self {
        self.default_components.push((name.to_string(), AssetPath::new(class)));
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.default_properties.set(name, value);
        self
    }

    pub fn spawning(mut self, class: &str) -> Self {
        self.spawns.push(AssetPath::new(class));
        self
    }

    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }

    pub fn without_transform(mut self) -> Self {
        self.has_transform = false;
        self
    }
}

// ============================================================================
// Persistent Object
// ============================================================================

/// Hook implementation that records every call in `hooks`
#[derive(Debug, Clone)]
pub struct SimObject {
    pub properties: PropertyBag,
    pub should_save: bool,
    pub stable_name: Option<String>,
    pub custom: Option<CustomState>,
    pub hooks: Vec<String>,
}

impl Default for SimObject {
    fn default() -> Self {
        Self {
            properties: PropertyBag::new(),
            should_save: true,
            stable_name: None,
            custom: None,
            hooks: Vec::new(),
        }
    }
}

impl SimObject {
    pub fn with_properties(properties: PropertyBag) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    fn record(&mut self, hook: &str) {
        self.hooks.push(hook.to_string());
    }
}

impl PersistentObject for SimObject {
    fn should_save_state(&self) -> bool {
        self.should_save
    }

    fn stable_name(&self) -> Option<String> {
        self.stable_name.clone()
    }

    fn pre_save_state(&mut self) {
        self.record("pre_save");
    }

    fn post_save_state(&mut self) {
        self.record("post_save");
    }

    fn pre_load_state(&mut self) {
        self.record("pre_load");
    }

    fn post_load_state(&mut self) {
        self.record("post_load");
    }

    fn save_custom_state(&self) -> Option<CustomState> {
        self.custom.clone()
    }

    fn load_custom_state(&mut self, state: &CustomState) {
        self.custom = Some(state.clone());
        self.record("load_custom");
    }

    fn save_properties(&self) -> PropertyBag {
        self.properties.clone()
    }

    fn load_properties(&mut self, properties: PropertyBag) {
        self.properties.merge(properties);
        self.record("load_properties");
    }
}

// ============================================================================
// Scene Graph
// ============================================================================

#[derive(Debug, Clone)]
struct SimNode {
    kind: NodeKind,
    name: String,
    class: Option<AssetPath>,
    outer: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    full_name_stable: bool,
    name_stable: bool,
    top_level_asset: bool,
    persistent_level: bool,
    owner: Option<NodeHandle>,
    has_transform: bool,
    transform: Transform,
    attach_parent: Option<NodeHandle>,
    attach_socket: String,
    tags: Vec<String>,
    object: Option<SimObject>,
}

impl SimNode {
    fn new(kind: NodeKind, name: &str, outer: Option<NodeHandle>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            class: None,
            outer,
            children: Vec::new(),
            full_name_stable: false,
            name_stable: false,
            top_level_asset: false,
            persistent_level: false,
            owner: None,
            has_transform: false,
            transform: Transform::IDENTITY,
            attach_parent: None,
            attach_socket: String::new(),
            tags: Vec::new(),
            object: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<SimNode>,
}

#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    world: NodeHandle,
    game_instance: NodeHandle,
    levels: Vec<NodeHandle>,
    classes: HashMap<AssetPath, ClassInfo>,
    assets: HashMap<AssetPath, NodeHandle>,
    subsystems: Vec<(ManagerScope, NodeHandle)>,
    data_layers: Vec<DataLayerInfo>,
    spawn_counter: u32,
}

impl SceneGraph {
    /// Empty world loaded from `world_path`, e.g. `/Game/Maps/World`
    pub fn new(world_path: &str) -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            free: Vec::new(),
            world: NodeHandle::new(0, 0),
            game_instance: NodeHandle::new(0, 0),
            levels: Vec::new(),
            classes: HashMap::new(),
            assets: HashMap::new(),
            subsystems: Vec::new(),
            data_layers: Vec::new(),
            spawn_counter: 0,
        };

        let mut world = SimNode::new(NodeKind::World, world_path, None);
        world.full_name_stable = true;
        graph.world = graph.insert(world);

        let mut instance = SimNode::new(NodeKind::Other, "/Script/Engine.GameInstance", None);
        instance.full_name_stable = true;
        graph.game_instance = graph.insert(instance);
        graph
    }

    fn insert(&mut self, node: SimNode) -> NodeHandle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeHandle::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeHandle::new((self.slots.len() - 1) as u32, 0)
            }
        }
    }

    fn node(&self, handle: NodeHandle) -> Option<&SimNode> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut SimNode> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn attach_child(&mut self, outer: NodeHandle, child: NodeHandle) {
        if let Some(node) = self.node_mut(outer) {
            node.children.push(child);
        }
    }

    fn children_of(&self, node: NodeHandle, kind: NodeKind) -> Vec<NodeHandle> {
        self.node(node)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| self.node(*c).is_some_and(|child| child.kind == kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // setup
    // ------------------------------------------------------------------

    pub fn world_node(&self) -> NodeHandle {
        self.world
    }

    pub fn register_class(&mut self, class: ClassInfo) {
        self.classes.insert(class.path.clone(), class);
    }

    pub fn unregister_class(&mut self, path: &str) {
        self.classes.remove(&AssetPath::new(path));
    }

    /// Top-level asset node addressable by its path
    pub fn add_asset(&mut self, path: &str) -> NodeHandle {
        let asset = AssetPath::new(path);
        if let Some(existing) = self.assets.get(&asset).copied().filter(|a| self.is_alive(*a)) {
            return existing;
        }
        let mut node = SimNode::new(NodeKind::Asset, path, None);
        node.full_name_stable = true;
        node.top_level_asset = true;
        let handle = self.insert(node);
        self.assets.insert(asset, handle);
        handle
    }

    pub fn add_level(&mut self, name: &str, persistent: bool) -> NodeHandle {
        let mut node = SimNode::new(NodeKind::Level, name, Some(self.world));
        node.full_name_stable = true;
        node.persistent_level = persistent;
        let handle = self.insert(node);
        self.attach_child(self.world, handle);
        self.levels.push(handle);
        handle
    }

    /// Destroy a level with everything in it
    pub fn remove_level(&mut self, level: NodeHandle) {
        self.destroy(level);
        self.levels.retain(|l| *l != level);
    }

    /// Actor loaded with the level content; its full path is stable
    pub fn place_actor(&mut self, level: NodeHandle, class: &str, name: &str) -> Result<NodeHandle> {
        let actor = self.allocate(&AssetPath::new(class), name, level)?;
        if let Some(node) = self.node_mut(actor) {
            node.full_name_stable = true;
        }
        self.finish_construction(actor, None)?;
        Ok(actor)
    }

    /// Actor created at runtime; returns it plus anything its construction spawned
    pub fn spawn_actor(
        &mut self,
        level: NodeHandle,
        class: &str,
        name: &str,
        transform: Transform,
    ) -> Result<(NodeHandle, Vec<NodeHandle>)> {
        let actor = self.allocate(&AssetPath::new(class), name, level)?;
        let spawned = self.finish_construction(actor, Some(transform))?;
        Ok((actor, spawned))
    }

    /// Component added to a live actor at runtime
    pub fn add_component(&mut self, actor: NodeHandle, class: &str, name: &str, name_stable: bool) -> Result<NodeHandle> {
        let component = self.allocate(&AssetPath::new(class), name, actor)?;
        if let Some(node) = self.node_mut(component) {
            node.name_stable = name_stable;
        }
        Ok(component)
    }

    pub fn add_subsystem(&mut self, scope: ManagerScope, class: &str) -> NodeHandle {
        let class = AssetPath::new(class);
        let outer = match scope {
            ManagerScope::World => self.world,
            ManagerScope::Game | ManagerScope::Profile => self.game_instance,
        };
        let mut node = SimNode::new(NodeKind::Subsystem, class.short_name(), Some(outer));
        node.class = Some(class);
        node.object = Some(SimObject::default());
        let handle = self.insert(node);
        self.attach_child(outer, handle);
        self.subsystems.push((scope, handle));
        handle
    }

    pub fn add_data_layer(&mut self, asset: &str, initial_state: DataLayerState) {
        self.data_layers.push(DataLayerInfo {
            asset: AssetPath::new(asset),
            initial_state,
            current_state: initial_state,
        });
    }

    pub fn data_layer_state(&self, asset: &str) -> Option<DataLayerState> {
        self.data_layers
            .iter()
            .find(|layer| layer.asset.as_str() == asset)
            .map(|layer| layer.current_state)
    }

    // ------------------------------------------------------------------
    // inspection
    // ------------------------------------------------------------------

    pub fn sim_object(&self, node: NodeHandle) -> Option<&SimObject> {
        self.node(node).and_then(|n| n.object.as_ref())
    }

    pub fn sim_object_mut(&mut self, node: NodeHandle) -> Option<&mut SimObject> {
        self.node_mut(node).and_then(|n| n.object.as_mut())
    }

    pub fn set_property(&mut self, node: NodeHandle, name: &str, value: PropertyValue) {
        if let Some(object) = self.sim_object_mut(node) {
            object.properties.set(name, value);
        }
    }

    pub fn property(&self, node: NodeHandle, name: &str) -> Option<&PropertyValue> {
        self.sim_object(node).and_then(|o| o.properties.get(name))
    }

    /// Live child of `outer` with the given name
    pub fn find_child(&self, outer: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.node(outer)?
            .children
            .iter()
            .copied()
            .find(|c| self.node(*c).is_some_and(|n| n.name == name))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }
}

impl GraphHost for SceneGraph {
    // ------------------------------------------------------------------
    // structure
    // ------------------------------------------------------------------

    fn is_alive(&self, node: NodeHandle) -> bool {
        self.node(node).is_some()
    }

    fn kind(&self, node: NodeHandle) -> Option<NodeKind> {
        self.node(node).map(|n| n.kind)
    }

    fn name(&self, node: NodeHandle) -> Option<String> {
        self.node(node).map(|n| n.name.clone())
    }

    fn class(&self, node: NodeHandle) -> Option<AssetPath> {
        self.node(node).and_then(|n| n.class.clone())
    }

    fn outer(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.node(node).and_then(|n| n.outer)
    }

    fn path_name(&self, node: NodeHandle) -> Option<String> {
        let sim = self.node(node)?;
        match sim.outer {
            Some(outer) => Some(format!("{}.{}", self.path_name(outer)?, sim.name)),
            None => Some(sim.name.clone()),
        }
    }

    fn is_full_name_stable(&self, node: NodeHandle) -> bool {
        self.node(node).is_some_and(|n| n.full_name_stable)
    }

    fn is_name_stable(&self, node: NodeHandle) -> bool {
        self.node(node).is_some_and(|n| n.name_stable)
    }

    fn is_top_level_asset(&self, node: NodeHandle) -> bool {
        self.node(node).is_some_and(|n| n.top_level_asset)
    }

    fn find_asset(&self, path: &AssetPath) -> Option<NodeHandle> {
        self.assets.get(path).copied().filter(|a| self.is_alive(*a))
    }

    fn level_of(&self, node: NodeHandle) -> Option<NodeHandle> {
        let mut cursor = self.outer(node);
        while let Some(current) = cursor {
            if self.kind(current) == Some(NodeKind::Level) {
                return Some(current);
            }
            cursor = self.outer(current);
        }
        None
    }

    fn is_persistent_level(&self, level: NodeHandle) -> bool {
        self.node(level).is_some_and(|n| n.persistent_level)
    }

    fn level_actors(&self, level: NodeHandle) -> Vec<NodeHandle> {
        self.children_of(level, NodeKind::Actor)
    }

    fn components(&self, actor: NodeHandle) -> Vec<NodeHandle> {
        self.children_of(actor, NodeKind::Component)
    }

    fn owner(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.node(node).and_then(|n| n.owner)
    }

    // ------------------------------------------------------------------
    // scene
    // ------------------------------------------------------------------

    fn has_transform(&self, node: NodeHandle) -> bool {
        self.node(node).is_some_and(|n| n.has_transform)
    }

    fn transform(&self, node: NodeHandle) -> Transform {
        self.node(node).map(|n| n.transform).unwrap_or_default()
    }

    fn attach_parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.node(node)
            .and_then(|n| n.attach_parent)
            .filter(|p| self.is_alive(*p))
    }

    fn attach_socket(&self, node: NodeHandle) -> String {
        self.node(node).map(|n| n.attach_socket.clone()).unwrap_or_default()
    }

    fn set_owner(&mut self, node: NodeHandle, owner: Option<NodeHandle>) {
        if let Some(n) = self.node_mut(node) {
            n.owner = owner;
        }
    }

    fn attach_to(&mut self, node: NodeHandle, parent: NodeHandle, socket: &str) {
        if node == parent || !self.is_alive(parent) {
            return;
        }
        if let Some(n) = self.node_mut(node) {
            n.attach_parent = Some(parent);
            n.attach_socket = socket.to_string();
        }
    }

    fn detach(&mut self, node: NodeHandle) {
        if let Some(n) = self.node_mut(node) {
            n.attach_parent = None;
            n.attach_socket.clear();
        }
    }

    fn set_relative_transform(&mut self, node: NodeHandle, transform: Transform) {
        if let Some(n) = self.node_mut(node) {
            n.transform = transform;
        }
    }

    fn set_world_transform(&mut self, node: NodeHandle, transform: Transform) {
        if let Some(n) = self.node_mut(node) {
            n.transform = transform;
        }
    }

    // ------------------------------------------------------------------
    // markers
    // ------------------------------------------------------------------

    fn add_tag(&mut self, node: NodeHandle, tag: &str) {
        if let Some(n) = self.node_mut(node) {
            n.tags.push(tag.to_string());
        }
    }

    fn has_tag(&self, node: NodeHandle, tag: &str) -> bool {
        self.node(node).is_some_and(|n| n.tags.iter().any(|t| t == tag))
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    fn destroy(&mut self, node: NodeHandle) {
        let Some(sim) = self.node(node) else {
            return;
        };
        let children = sim.children.clone();
        let outer = sim.outer;
        for child in children {
            self.destroy(child);
        }
        if let Some(outer) = outer {
            if let Some(parent) = self.node_mut(outer) {
                parent.children.retain(|c| *c != node);
            }
        }
        for slot in self.slots.iter_mut() {
            if let Some(other) = slot.node.as_mut() {
                if other.attach_parent == Some(node) {
                    other.attach_parent = None;
                    other.attach_socket.clear();
                }
                if other.owner == Some(node) {
                    other.owner = None;
                }
            }
        }
        let slot = &mut self.slots[node.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node.index);
    }

    fn resolve_class(&self, class: &AssetPath) -> bool {
        self.classes.contains_key(class)
    }

    fn allocate(&mut self, class: &AssetPath, name: &str, outer: NodeHandle) -> Result<NodeHandle> {
        let info = self
            .classes
            .get(class)
            .cloned()
            .ok_or_else(|| PersistError::UnresolvedReference(format!("class {}", class)))?;
        if !self.is_alive(outer) {
            return Err(PersistError::InvalidState(format!("outer {} of new {} is dead", outer, name)));
        }

        let mut sim = SimNode::new(info.kind, name, Some(outer));
        sim.class = Some(info.path.clone());
        sim.has_transform = info.has_transform;
        sim.object = info
            .persistent
            .then(|| SimObject::with_properties(info.default_properties.clone()));
        let node = self.insert(sim);
        self.attach_child(outer, node);

        for (component_name, component_class) in &info.default_components {
            let component = self.allocate(component_class, component_name, node)?;
            if let Some(c) = self.node_mut(component) {
                c.name_stable = true;
            }
        }
        Ok(node)
    }

    fn finish_construction(&mut self, node: NodeHandle, transform: Option<Transform>) -> Result<Vec<NodeHandle>> {
        let (class, outer, name) = {
            let sim = self
                .node_mut(node)
                .ok_or_else(|| PersistError::InvalidState(format!("node {} died during construction", node)))?;
            if let Some(transform) = transform {
                sim.transform = transform;
            }
            (sim.class.clone(), sim.outer, sim.name.clone())
        };

        let spawns = class
            .and_then(|c| self.classes.get(&c))
            .map(|info| info.spawns.clone())
            .unwrap_or_default();
        let mut spawned = Vec::new();
        if let Some(level) = outer.filter(|o| self.kind(*o) == Some(NodeKind::Level)) {
            for spawn_class in spawns {
                self.spawn_counter += 1;
                let spawn_name = format!("{}_Spawned{}", name, self.spawn_counter);
                let child = self.allocate(&spawn_class, &spawn_name, level)?;
                spawned.push(child);
                spawned.extend(self.finish_construction(child, None)?);
            }
        }
        Ok(spawned)
    }

    // ------------------------------------------------------------------
    // hooks
    // ------------------------------------------------------------------

    fn object(&self, node: NodeHandle) -> Option<&dyn PersistentObject> {
        self.node(node)
            .and_then(|n| n.object.as_ref())
            .map(|o| o as &dyn PersistentObject)
    }

    fn object_mut(&mut self, node: NodeHandle) -> Option<&mut dyn PersistentObject> {
        self.node_mut(node)
            .and_then(|n| n.object.as_mut())
            .map(|o| o as &mut dyn PersistentObject)
    }

    // ------------------------------------------------------------------
    // enumeration
    // ------------------------------------------------------------------

    fn world(&self) -> Option<NodeHandle> {
        Some(self.world)
    }

    fn levels(&self) -> Vec<NodeHandle> {
        let mut levels: Vec<NodeHandle> = self.levels.iter().copied().filter(|l| self.is_alive(*l)).collect();
        levels.sort_by_key(|l| !self.is_persistent_level(*l));
        levels
    }

    fn subsystems(&self, scope: ManagerScope) -> Vec<NodeHandle> {
        self.subsystems
            .iter()
            .filter(|(s, node)| *s == scope && self.is_alive(*node))
            .map(|(_, node)| *node)
            .collect()
    }

    fn data_layers(&self, world: NodeHandle) -> Vec<DataLayerInfo> {
        if world != self.world {
            return Vec::new();
        }
        self.data_layers.clone()
    }

    fn set_data_layer_state(&mut self, world: NodeHandle, asset: &AssetPath, state: DataLayerState) {
        if world != self.world {
            return;
        }
        if let Some(layer) = self.data_layers.iter_mut().find(|l| &l.asset == asset) {
            layer.current_state = state;
        }
    }
}
