//! Admin client seams.
//!
//! The provisioner never speaks the broker protocol itself. Everything it
//! needs from the remote cluster goes through these traits, implemented by a
//! real admin client or by [`crate::memory::MemoryCluster`] in tests.

use async_trait::async_trait;
use mqkit_common::{
    AdminResult, ClusterInfo, SubscriptionGroupConfig, TopicConfigAndQueueMapping,
    TopicRemappingDetail, TopicStatsTable,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Broker name to that broker's config and mapping for one static topic.
pub type BrokerConfigMap = BTreeMap<String, TopicConfigAndQueueMapping>;

/// Options an admin session is built from.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Name-server address the session is bound to
    pub namesrv_addr: String,
    /// Client instance name, unique per session
    pub instance_name: String,
    /// Per-call RPC timeout
    pub rpc_timeout: Duration,
}

/// A short-lived admin connection bound to one name-server.
#[async_trait]
pub trait AdminSession: Send + Sync + 'static {
    /// Connect to the endpoint. Every other call requires a started session.
    async fn start(&mut self) -> AdminResult<()>;

    /// Close the session.
    async fn shutdown(&mut self) -> AdminResult<()>;

    /// Ask the cluster to create `topic` with `queue_num` queues per broker.
    async fn create_topic(&self, cluster: &str, topic: &str, queue_num: u32) -> AdminResult<()>;

    /// Create or overwrite a subscription group on the broker at `addr`.
    async fn create_and_update_subscription_group_config(
        &self,
        addr: &str,
        config: &SubscriptionGroupConfig,
    ) -> AdminResult<()>;

    /// Per-queue offsets of `topic` across the cluster.
    async fn examine_topic_stats(&self, topic: &str) -> AdminResult<TopicStatsTable>;

    /// Broker topology known to the name-server.
    async fn examine_broker_cluster_info(&self) -> AdminResult<ClusterInfo>;

    /// Master addresses of every broker set in `cluster`.
    async fn fetch_master_addrs_by_cluster(&self, cluster: &str) -> AdminResult<BTreeSet<String>> {
        self.examine_broker_cluster_info().await?.master_addrs(cluster)
    }
}

/// Builds unstarted admin sessions.
pub trait AdminClientFactory: Send + Sync {
    type Session: AdminSession;

    fn create(&self, options: SessionOptions) -> Self::Session;
}

/// Remote reads and writes of static-topic queue mappings.
#[async_trait]
pub trait StaticTopicAdmin: Send + Sync {
    /// Current config and mapping of `topic` on every broker that hosts it.
    async fn examine_topic_config_all(&self, topic: &str) -> AdminResult<BrokerConfigMap>;

    /// Add entries for brokers referenced by old mapping generations but
    /// missing from `configs`.
    async fn complete_no_target_brokers(&self, configs: &mut BrokerConfigMap) -> AdminResult<()>;

    /// Write every entry of `configs` to its broker.
    async fn update_topic_config_mapping_all(
        &self,
        configs: &BrokerConfigMap,
        force: bool,
    ) -> AdminResult<()>;

    /// Apply a planned remapping, brokers mapped in before brokers mapped out.
    async fn remap_static_topic(
        &self,
        topic: &str,
        broker_to_map_in: &BTreeSet<String>,
        broker_to_map_out: &BTreeSet<String>,
        configs: &mut BrokerConfigMap,
        block_seq_size: i64,
        force: bool,
    ) -> AdminResult<()>;
}

/// Local computation of static-topic queue placements.
pub trait QueueMappingPlanner: Send + Sync {
    /// Fill `configs` with a fresh mapping of `queue_num` global queues over `targets`.
    fn create_topic_config_mapping(
        &self,
        topic: &str,
        queue_num: u32,
        targets: &BTreeSet<String>,
        configs: &mut BrokerConfigMap,
    ) -> AdminResult<()>;

    /// Move queues so only `targets` host them, updating `configs` in place.
    fn plan_remapping(
        &self,
        topic: &str,
        configs: &mut BrokerConfigMap,
        targets: &BTreeSet<String>,
    ) -> AdminResult<TopicRemappingDetail>;
}
