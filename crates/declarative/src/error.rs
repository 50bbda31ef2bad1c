//! Error types for script resolution and convergence runs

use thiserror::Error;

use crate::resource::ResourceId;
use crate::types::{Action, ResourceKind};

/// Errors raised while building or validating a run list
///
/// These are all detected before any resource is evaluated.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown resource type: {0}")]
    UnknownKind(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid resource reference '{0}' (expected type[name])")]
    InvalidReference(String),

    #[error("{source_id} notifies {target} which is not declared in this run")]
    DanglingNotification {
        source_id: ResourceId,
        target: ResourceId,
    },

    #[error("{subscriber} subscribes to {source_id} which is not declared in this run")]
    DanglingSubscription {
        subscriber: ResourceId,
        source_id: ResourceId,
    },

    #[error("no provider registered for {0} resources")]
    NoProvider(ResourceKind),

    #[error("{resource} does not support action :{action}")]
    UnsupportedAction { resource: ResourceId, action: Action },

    #[error("{0} declares no actions")]
    NoActions(ResourceId),

    #[error("unsupported platform '{0}' and strict platform checking is enabled")]
    UnsupportedPlatform(String),
}

/// Result type for script operations
pub type Result<T> = std::result::Result<T, Error>;
