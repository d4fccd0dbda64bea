//! Capability interface between the persistence core and the hosting runtime.
//!
//! The core never owns live nodes. It reads graph structure through [`GraphHost`],
//! drives per-node hooks through [`PersistentObject`], and recreates dynamic nodes with
//! the two-phase `allocate` / `finish_construction` pair so identity is bound before any
//! construction-time code runs.

pub mod property;

use crate::core::{AssetPath, CustomState, DataLayerState, ManagerScope, NodeHandle, NodeKind, Result, Transform};

pub use property::{Property, PropertyBag, PropertyValue};

/// Marker tag for nodes linked to a static record
pub const STATIC_TAG: &str = "persist.static";
/// Marker tag for nodes linked to a dynamic record
pub const DYNAMIC_TAG: &str = "persist.dynamic";

/// Hooks every persistable node exposes. All of them default to no-ops.
pub trait PersistentObject {
    /// Once this returned true for a saved record it must keep returning true
    fn should_save_state(&self) -> bool {
        true
    }

    /// Name used for identity when the node is constructed at runtime but should stay static
    fn stable_name(&self) -> Option<String> {
        None
    }

    fn pre_save_state(&mut self) {}
    fn post_save_state(&mut self) {}
    fn pre_load_state(&mut self) {}
    fn post_load_state(&mut self) {}

    fn save_custom_state(&self) -> Option<CustomState> {
        None
    }

    fn load_custom_state(&mut self, _state: &CustomState) {}

    /// Properties flagged for save games
    fn save_properties(&self) -> PropertyBag {
        PropertyBag::default()
    }

    fn load_properties(&mut self, _properties: PropertyBag) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayerInfo {
    pub asset: AssetPath,
    pub initial_state: DataLayerState,
    pub current_state: DataLayerState,
}

/// Everything the core needs from the hosting runtime.
pub trait GraphHost {
    // ------------------------------------------------------------------
    // structure
    // ------------------------------------------------------------------

    fn is_alive(&self, node: NodeHandle) -> bool;
    fn kind(&self, node: NodeHandle) -> Option<NodeKind>;
    fn name(&self, node: NodeHandle) -> Option<String>;
    fn class(&self, node: NodeHandle) -> Option<AssetPath>;
    /// Structural container (level for actors, actor for components, world for levels)
    fn outer(&self, node: NodeHandle) -> Option<NodeHandle>;
    /// Fully qualified path of the node
    fn path_name(&self, node: NodeHandle) -> Option<String>;
    /// True for nodes loaded from content whose full path is stable between runs
    fn is_full_name_stable(&self, node: NodeHandle) -> bool;
    /// True for fixed sub-elements and nodes whose local name is stable within their outer
    fn is_name_stable(&self, node: NodeHandle) -> bool;
    fn is_top_level_asset(&self, node: NodeHandle) -> bool;
    fn find_asset(&self, path: &AssetPath) -> Option<NodeHandle>;
    fn level_of(&self, node: NodeHandle) -> Option<NodeHandle>;
    fn is_persistent_level(&self, level: NodeHandle) -> bool;
    fn level_actors(&self, level: NodeHandle) -> Vec<NodeHandle>;
    fn components(&self, actor: NodeHandle) -> Vec<NodeHandle>;
    fn owner(&self, node: NodeHandle) -> Option<NodeHandle>;

    fn asset_path(&self, node: NodeHandle) -> Option<AssetPath> {
        if self.is_top_level_asset(node) {
            self.path_name(node).map(AssetPath::new)
        } else {
            None
        }
    }

    fn implements_persistence(&self, node: NodeHandle) -> bool {
        self.object(node).is_some()
    }

    // ------------------------------------------------------------------
    // scene
    // ------------------------------------------------------------------

    fn has_transform(&self, node: NodeHandle) -> bool;
    /// Relative transform when attached, world transform otherwise
    fn transform(&self, node: NodeHandle) -> Transform;
    fn attach_parent(&self, node: NodeHandle) -> Option<NodeHandle>;
    fn attach_socket(&self, node: NodeHandle) -> String;
    fn set_owner(&mut self, node: NodeHandle, owner: Option<NodeHandle>);
    fn attach_to(&mut self, node: NodeHandle, parent: NodeHandle, socket: &str);
    fn detach(&mut self, node: NodeHandle);
    fn set_relative_transform(&mut self, node: NodeHandle, transform: Transform);
    fn set_world_transform(&mut self, node: NodeHandle, transform: Transform);

    // ------------------------------------------------------------------
    // markers
    // ------------------------------------------------------------------

    fn add_tag(&mut self, node: NodeHandle, tag: &str);
    fn has_tag(&self, node: NodeHandle, tag: &str) -> bool;

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    fn destroy(&mut self, node: NodeHandle);
    /// True if the class can still be instantiated
    fn resolve_class(&self, class: &AssetPath) -> bool;
    /// First construction phase: the raw node exists but no construction code has run
    fn allocate(&mut self, class: &AssetPath, name: &str, outer: NodeHandle) -> Result<NodeHandle>;
    /// Second construction phase. Returns nodes spawned while constructing.
    fn finish_construction(&mut self, node: NodeHandle, transform: Option<Transform>) -> Result<Vec<NodeHandle>>;

    // ------------------------------------------------------------------
    // hooks
    // ------------------------------------------------------------------

    fn object(&self, node: NodeHandle) -> Option<&dyn PersistentObject>;
    fn object_mut(&mut self, node: NodeHandle) -> Option<&mut dyn PersistentObject>;

    // ------------------------------------------------------------------
    // enumeration
    // ------------------------------------------------------------------

    fn world(&self) -> Option<NodeHandle>;
    /// Levels currently loaded into the world, persistent level first
    fn levels(&self) -> Vec<NodeHandle>;
    fn subsystems(&self, scope: ManagerScope) -> Vec<NodeHandle>;
    fn data_layers(&self, world: NodeHandle) -> Vec<DataLayerInfo>;
    fn set_data_layer_state(&mut self, world: NodeHandle, asset: &AssetPath, state: DataLayerState);
}

/// Tag a linked node so discovery can classify it without its record
pub fn mark_static(host: &mut dyn GraphHost, node: NodeHandle) {
    if !host.has_tag(node, STATIC_TAG) {
        host.add_tag(node, STATIC_TAG);
    }
}

pub fn mark_dynamic(host: &mut dyn GraphHost, node: NodeHandle) {
    if !host.has_tag(node, DYNAMIC_TAG) {
        host.add_tag(node, DYNAMIC_TAG);
    }
}

pub fn is_marked_static(host: &dyn GraphHost, node: NodeHandle) -> bool {
    host.has_tag(node, STATIC_TAG)
}

pub fn is_marked_dynamic(host: &dyn GraphHost, node: NodeHandle) -> bool {
    host.has_tag(node, DYNAMIC_TAG)
}
