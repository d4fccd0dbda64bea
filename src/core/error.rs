use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Object id {guid} is already bound to live node {existing}, cannot bind {incoming}")]
    IdCollision {
        guid: Uuid,
        existing: String,
        incoming: String,
    },

    #[error("Persistent object transitioned from saveable to not saveable: {0}")]
    PersistRegression(String),

    #[error("State record is not linked to a live node: {0}")]
    RecordNotLinked(String),

    #[error("Malformed chunk header: {0}")]
    MalformedChunk(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PersistError {
    /// Programmer errors that indicate a corrupted identity table or record graph.
    /// The orchestration layer stops the current request when it sees one of these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PersistError::IdCollision { .. }
                | PersistError::PersistRegression(_)
                | PersistError::RecordNotLinked(_)
                | PersistError::MalformedChunk(_)
                | PersistError::InvalidState(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
