//! Nodes Monitor Error Hierarchy
//!
//! Errors are split by who can act on them:
//! - caller errors are returned to the requesting operation and never retried
//! - integrity errors indicate a registry bug and abort the operation loudly
//! - remote and store errors are transient; the scan and flush paths record
//!   them as detention or retry state instead of propagating them

use std::time::Duration;

use config::ConfigError;

use crate::NodeId;
use crate::PeerId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Errors caused by the request itself
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// Registry index corruption
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Agent RPC failures, including timeouts
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Durable store failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor not started")]
    NotStarted,

    #[error("Monitor not loaded")]
    NotLoaded,

    #[error("No such node: {0}")]
    NoSuchNode(String),

    #[error("No such host: {0}")]
    NoSuchHost(String),

    #[error("Node offline: {0}")]
    NodeOffline(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The connection is already bound to another node item
    #[error("Connection {connection_id} already bound to node {node_id}")]
    ConnectionInUse { connection_id: u64, node_id: NodeId },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Node id collision: {0}")]
    IdCollision(NodeId),

    #[error("Node peer id collision: {0}")]
    PeerIdCollision(PeerId),

    #[error("Node name collision: {0}")]
    NameCollision(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{op} timed out after {duration:?}")]
    Timeout { op: &'static str, duration: Duration },

    /// The agent reports that its storage root is gone
    #[error("Storage does not exist: {0}")]
    StorageNotExist(String),

    /// The agent could not authenticate against its backing storage
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// A second live agent claims the same node from a different host
    #[error("Duplicate agent for node {node_id}: connected from {existing}, rejected {incoming}")]
    Duplicate {
        node_id: NodeId,
        existing: String,
        incoming: String,
    },

    #[error("Rpc {code} failed: {message}")]
    Rpc { code: String, message: String },

    #[error("Connection closed")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Node store unavailable: {0}")]
    Unavailable(String),

    #[error("Node store write failed: {0}")]
    WriteFailed(String),
}

impl Error {
    /// Errors the caller caused and should not retry
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Monitor(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote(_))
    }

    pub fn is_duplicate_agent(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::Duplicate { .. }))
    }

    pub(crate) fn is_storage_not_exist(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::StorageNotExist(_)))
    }

    pub(crate) fn is_auth_failed(&self) -> bool {
        matches!(self, Error::Remote(RemoteError::AuthFailed(_)))
    }
}
