//! Fire-and-forget session release.

use tracing::debug;

use crate::client::AdminSession;

/// Shut `session` down on a detached tokio task.
///
/// The caller gets no handle and no result. Shutdown errors are logged at
/// debug level and dropped, and the task is not guaranteed to finish before
/// the runtime or process exits.
pub fn release_detached<S: AdminSession>(mut session: S, instance_name: String) {
    tokio::spawn(async move {
        match session.shutdown().await {
            Ok(()) => debug!(instance = %instance_name, "Admin session released"),
            Err(e) => debug!(instance = %instance_name, error = %e, "Admin session shutdown failed"),
        }
    });
}
