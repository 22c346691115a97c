//! Create-then-confirm helpers for integration test setup.
//!
//! Every operation opens its own admin session against the given name-server,
//! issues its request, optionally polls a read-back query until the result is
//! observable, and hands the session to a detached task for shutdown. None of
//! them return an error: failures degrade to an unconfirmed outcome or `None`,
//! with the underlying cause kept in the outcome for callers that care.

use mqkit_common::{AdminError, AdminResult, ClusterInfo, SubscriptionGroupConfig};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::client::{AdminClientFactory, AdminSession, SessionOptions};
use crate::config::ProvisionConfig;
use crate::poll::{poll_until, PollOutcome, PollSchedule};
use crate::teardown::release_detached;

/// What happened to the create request itself.
#[derive(Debug)]
pub enum RequestStatus {
    /// The admin client reported success
    Accepted,
    /// The admin client reported an error. The resource may still exist,
    /// either from an earlier run or because the error was spurious.
    Rejected(AdminError),
    /// No session could be started, nothing was sent
    SessionUnavailable(AdminError),
}

impl RequestStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RequestStatus::Accepted)
    }

    pub fn error(&self) -> Option<&AdminError> {
        match self {
            RequestStatus::Accepted => None,
            RequestStatus::Rejected(e) | RequestStatus::SessionUnavailable(e) => Some(e),
        }
    }
}

/// Result of [`Provisioner::create_topic`].
#[derive(Debug)]
pub struct TopicProvision {
    pub topic: String,
    pub request: RequestStatus,
    /// `None` when the operation aborted before polling
    pub outcome: Option<PollOutcome>,
}

impl TopicProvision {
    /// Whether the topic was observed with a non-empty offset table.
    pub fn is_confirmed(&self) -> bool {
        self.outcome.is_some_and(|outcome| outcome.is_visible())
    }

    /// Human-readable reason the topic is not confirmed.
    pub fn failure_reason(&self) -> Option<String> {
        if self.is_confirmed() {
            return None;
        }
        match &self.request {
            RequestStatus::SessionUnavailable(e) => Some(format!(
                "admin session unavailable, create topic[{}] failed: {}",
                self.topic, e
            )),
            _ => Some(format!("timeout, but create topic[{}] failed", self.topic)),
        }
    }
}

impl fmt::Display for TopicProvision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure_reason() {
            None => write!(f, "topic[{}] confirmed", self.topic),
            Some(reason) => f.write_str(&reason),
        }
    }
}

/// Outcome of one fan-out target.
#[derive(Debug)]
pub struct TargetOutcome {
    pub addr: String,
    pub result: AdminResult<()>,
}

/// Result of [`Provisioner::create_subscription_group`].
#[derive(Debug)]
pub struct SubscriptionProvision {
    pub group: String,
    /// Set when the session or the master lookup failed and no target was tried
    pub aborted: Option<AdminError>,
    /// One entry per master address, in the order they were attempted
    pub targets: Vec<TargetOutcome>,
}

impl SubscriptionProvision {
    /// True iff nothing aborted and every target accepted the group.
    pub fn is_confirmed(&self) -> bool {
        self.aborted.is_none() && self.targets.iter().all(|t| t.result.is_ok())
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter(|t| t.result.is_err())
            .map(|t| t.addr.as_str())
    }
}

/// A started session plus the instance name it was registered with.
struct Lease<S: AdminSession> {
    session: S,
    instance: String,
}

impl<S: AdminSession> Lease<S> {
    fn release(self) {
        release_detached(self.session, self.instance);
    }
}

/// Eventually-consistent provisioning over an admin client.
pub struct Provisioner<F: AdminClientFactory> {
    factory: F,
    config: ProvisionConfig,
}

impl<F: AdminClientFactory> Provisioner<F> {
    pub fn new(factory: F, config: ProvisionConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Name-server address from the configuration.
    pub fn default_endpoint(&self) -> &str {
        &self.config.namesrv_addr
    }

    fn session_options(&self, namesrv_addr: &str) -> SessionOptions {
        SessionOptions {
            namesrv_addr: namesrv_addr.to_string(),
            instance_name: format!("{}-{}", self.config.instance_prefix, Uuid::new_v4()),
            rpc_timeout: self.config.rpc_timeout(),
        }
    }

    async fn open_session(&self, namesrv_addr: &str) -> AdminResult<Lease<F::Session>> {
        let options = self.session_options(namesrv_addr);
        let instance = options.instance_name.clone();
        let mut session = self.factory.create(options);

        match session.start().await {
            Ok(()) => Ok(Lease { session, instance }),
            Err(e) => {
                release_detached(session, instance);
                Err(e)
            }
        }
    }

    /// Create `topic` and wait up to the configured default budget for it to
    /// show up in topic stats.
    pub async fn create_topic(
        &self,
        namesrv_addr: &str,
        cluster: &str,
        topic: &str,
        queue_num: u32,
    ) -> TopicProvision {
        self.create_topic_with_wait(namesrv_addr, cluster, topic, queue_num, self.config.default_wait())
            .await
    }

    /// Create `topic` and wait up to `wait` for it to show up in topic stats.
    ///
    /// A failed create request does not stop the read-back: the topic counts
    /// as provisioned whenever it becomes visible within the budget.
    pub async fn create_topic_with_wait(
        &self,
        namesrv_addr: &str,
        cluster: &str,
        topic: &str,
        queue_num: u32,
        wait: Duration,
    ) -> TopicProvision {
        let lease = match self.open_session(namesrv_addr).await {
            Ok(lease) => lease,
            Err(e) => {
                let provision = TopicProvision {
                    topic: topic.to_string(),
                    request: RequestStatus::SessionUnavailable(e),
                    outcome: None,
                };
                error!(namesrv = %namesrv_addr, "{}", provision);
                return provision;
            }
        };

        let request = match lease.session.create_topic(cluster, topic, queue_num).await {
            Ok(()) => RequestStatus::Accepted,
            Err(e) => {
                debug!(topic = %topic, cluster = %cluster, error = %e, "Create topic request failed, polling anyway");
                RequestStatus::Rejected(e)
            }
        };

        let schedule = PollSchedule::new(wait, self.config.poll_interval());
        let session = &lease.session;
        let outcome = poll_until(schedule, || topic_present(session, topic)).await;

        let provision = TopicProvision {
            topic: topic.to_string(),
            request,
            outcome: Some(outcome),
        };
        if provision.is_confirmed() {
            debug!(topic = %topic, attempts = outcome.attempts(), "Topic visible");
        } else {
            error!(attempts = outcome.attempts(), "{}", provision);
        }

        lease.release();
        provision
    }

    /// One-shot presence check: true iff topic stats come back non-empty.
    pub async fn topic_exists(&self, namesrv_addr: &str, topic: &str) -> bool {
        let Ok(lease) = self.open_session(namesrv_addr).await else {
            return false;
        };
        let present = topic_present(&lease.session, topic).await;
        lease.release();
        present
    }

    /// Create subscription group `group` with default settings on every
    /// master of `cluster`.
    pub async fn create_subscription_group(
        &self,
        namesrv_addr: &str,
        cluster: &str,
        group: &str,
    ) -> SubscriptionProvision {
        self.create_subscription_group_with_config(namesrv_addr, cluster, SubscriptionGroupConfig::new(group))
            .await
    }

    /// Push `config` to every master of `cluster`.
    ///
    /// Targets are tried one after another. A failed target is logged and
    /// followed by the configured failure pause, then the next target is
    /// tried. Failed targets are not retried.
    pub async fn create_subscription_group_with_config(
        &self,
        namesrv_addr: &str,
        cluster: &str,
        config: SubscriptionGroupConfig,
    ) -> SubscriptionProvision {
        let group = config.group_name.clone();
        let aborted = |e: AdminError| SubscriptionProvision {
            group: group.clone(),
            aborted: Some(e),
            targets: Vec::new(),
        };

        let lease = match self.open_session(namesrv_addr).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(group = %group, namesrv = %namesrv_addr, error = %e, "Failed to start admin session");
                return aborted(e);
            }
        };

        let masters = match lease.session.fetch_master_addrs_by_cluster(cluster).await {
            Ok(masters) => masters,
            Err(e) => {
                error!(group = %group, cluster = %cluster, error = %e, "Failed to resolve master brokers");
                lease.release();
                return aborted(e);
            }
        };

        let mut targets = Vec::with_capacity(masters.len());
        for addr in masters {
            let result = lease
                .session
                .create_and_update_subscription_group_config(&addr, &config)
                .await;
            match &result {
                Ok(()) => info!("create subscription group {} to {} success.", group, addr),
                Err(e) => {
                    warn!(group = %group, addr = %addr, error = %e, "Failed to create subscription group");
                    tokio::time::sleep(self.config.failure_pause()).await;
                }
            }
            targets.push(TargetOutcome { addr, result });
        }

        lease.release();
        SubscriptionProvision {
            group,
            aborted: None,
            targets,
        }
    }

    /// Resolve and log the masters a subscription group on `cluster` would be
    /// created on, without creating anything.
    pub async fn describe_subscription_targets(
        &self,
        namesrv_addr: &str,
        cluster: &str,
    ) -> Option<BTreeSet<String>> {
        let lease = match self.open_session(namesrv_addr).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(namesrv = %namesrv_addr, error = %e, "Failed to start admin session");
                return None;
            }
        };

        let masters = lease.session.fetch_master_addrs_by_cluster(cluster).await;
        lease.release();

        match masters {
            Ok(masters) => {
                for addr in &masters {
                    info!(cluster = %cluster, addr = %addr, "Subscription target");
                }
                Some(masters)
            }
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Failed to resolve master brokers");
                None
            }
        }
    }

    /// Broker topology from the name-server, or `None` on any failure.
    pub async fn get_cluster(&self, namesrv_addr: &str) -> Option<ClusterInfo> {
        let lease = match self.open_session(namesrv_addr).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(namesrv = %namesrv_addr, error = %e, "Failed to start admin session");
                return None;
            }
        };

        let info = lease.session.examine_broker_cluster_info().await;
        lease.release();

        match info {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(namesrv = %namesrv_addr, error = %e, "Failed to examine cluster info");
                None
            }
        }
    }

    /// Whether any broker address in the cluster contains `addr_fragment`.
    /// False when the cluster cannot be looked up.
    pub async fn is_broker_exist(&self, namesrv_addr: &str, addr_fragment: &str) -> bool {
        self.get_cluster(namesrv_addr)
            .await
            .is_some_and(|info| info.contains_broker_addr(addr_fragment))
    }
}

/// A topic is present once its stats query succeeds with at least one queue.
async fn topic_present<S: AdminSession>(session: &S, topic: &str) -> bool {
    match session.examine_topic_stats(topic).await {
        Ok(stats) => !stats.is_empty(),
        Err(e) => {
            trace!(topic = %topic, error = %e, "Topic not visible yet");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCluster;

    #[test]
    fn test_session_options_unique_instance_names() {
        let config = ProvisionConfig {
            instance_prefix: "it-admin".to_string(),
            rpc_timeout_ms: 500,
            ..Default::default()
        };
        let provisioner = Provisioner::new(MemoryCluster::new("127.0.0.1:9876"), config);

        let first = provisioner.session_options("127.0.0.1:9876");
        let second = provisioner.session_options("127.0.0.1:9876");

        assert!(first.instance_name.starts_with("it-admin-"));
        assert_ne!(first.instance_name, second.instance_name);
        assert_eq!(first.rpc_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_subscription_provision_with_no_targets_is_confirmed() {
        let provision = SubscriptionProvision {
            group: "cg".to_string(),
            aborted: None,
            targets: Vec::new(),
        };
        assert!(provision.is_confirmed());
        assert_eq!(provision.failed_targets().count(), 0);
    }

    #[test]
    fn test_topic_provision_display() {
        let confirmed = TopicProvision {
            topic: "orders".to_string(),
            request: RequestStatus::Accepted,
            outcome: Some(PollOutcome::Visible {
                attempts: 1,
                elapsed: Duration::ZERO,
            }),
        };
        assert_eq!(confirmed.to_string(), "topic[orders] confirmed");

        let timed_out = TopicProvision {
            topic: "orders".to_string(),
            request: RequestStatus::Rejected(AdminError::TopicNotFound("orders".to_string())),
            outcome: Some(PollOutcome::TimedOut {
                attempts: 11,
                elapsed: Duration::from_secs(1),
            }),
        };
        assert_eq!(timed_out.to_string(), "timeout, but create topic[orders] failed");
        assert!(timed_out.request.error().is_some());
    }
}
