//! Error types for admin client calls.

use thiserror::Error;

/// Result type alias for admin client operations.
pub type AdminResult<T> = std::result::Result<T, AdminError>;

/// Errors reported by an admin client talking to a name-server or broker.
#[derive(Error, Debug)]
pub enum AdminError {
    /// The endpoint could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A call was issued on a session that was never started
    #[error("Admin session not started")]
    NotStarted,

    /// No cluster with the given name is registered
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// The topic has no route yet
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The broker name is not part of the cluster topology
    #[error("Broker not found: {0}")]
    BrokerNotFound(String),

    /// The remote side answered with a non-success response code
    #[error("Broker error (code {code}): {remark}")]
    Broker { code: i32, remark: String },

    /// Static-topic queue mapping could not be computed or applied
    #[error("Queue mapping error: {0}")]
    Mapping(String),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
