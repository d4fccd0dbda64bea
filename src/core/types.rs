use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Node Handles
// ============================================================================

/// Non-owning reference to a live node in the host arena.
///
/// The host bumps `generation` when a slot is reused, so a handle to a destroyed
/// node never aliases the node that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    pub index: u32,
    pub generation: u32,
}

impl NodeHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    World,
    Level,
    Actor,
    Component,
    Subsystem,
    Asset,
    Other,
}

// ============================================================================
// Asset Paths
// ============================================================================

/// Path of a top-level asset or class, resolvable independently of any save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AssetPath(String);

impl AssetPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last path segment, e.g. `Door` for `/Game/Props.Door`
    pub fn short_name(&self) -> &str {
        self.0
            .rsplit(['.', '/', ':'])
            .next()
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetPath {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Tolerance used when deciding whether a static node moved since its default snapshot.
pub const TRANSFORM_TOLERANCE: f64 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            translation: [x, y, z],
            ..Self::IDENTITY
        }
    }

    pub fn nearly_equals(&self, other: &Transform, tolerance: f64) -> bool {
        let close = |a: &[f64], b: &[f64]| a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance);
        close(&self.translation, &other.translation)
            && close(&self.rotation, &other.rotation)
            && close(&self.scale, &other.scale)
    }

    pub(crate) fn components(&self) -> [f64; 10] {
        let [tx, ty, tz] = self.translation;
        let [rx, ry, rz, rw] = self.rotation;
        let [sx, sy, sz] = self.scale;
        [tx, ty, tz, rx, ry, rz, rw, sx, sy, sz]
    }

    pub(crate) fn from_components(c: [f64; 10]) -> Self {
        Self {
            translation: [c[0], c[1], c[2]],
            rotation: [c[3], c[4], c[5], c[6]],
            scale: [c[7], c[8], c[9]],
        }
    }
}

// ============================================================================
// Opaque Custom State
// ============================================================================

/// Caller-defined extra state, tagged with the type that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomState {
    pub type_tag: String,
    pub bytes: Vec<u8>,
}

impl CustomState {
    pub fn new(type_tag: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            type_tag: type_tag.into(),
            bytes,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.type_tag.is_empty()
    }
}

// ============================================================================
// Manager Storage Scope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerScope {
    /// Per-user data that outlives individual games
    Profile,
    /// Per-game data shared by every world in a slot
    Game,
    /// Per-world data
    World,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLayerState {
    Unloaded,
    Loaded,
    Activated,
}

impl DataLayerState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            DataLayerState::Unloaded => 0,
            DataLayerState::Loaded => 1,
            DataLayerState::Activated => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataLayerState::Unloaded),
            1 => Some(DataLayerState::Loaded),
            2 => Some(DataLayerState::Activated),
            _ => None,
        }
    }
}
