pub mod error;
pub mod types;

pub use error::{PersistError, Result};
pub use types::{
    AssetPath, CustomState, DataLayerState, ManagerScope, NodeHandle, NodeKind, TRANSFORM_TOLERANCE,
    Transform,
};
