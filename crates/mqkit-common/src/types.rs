//! Admin data model as returned by the name-server and brokers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AdminError, AdminResult};

/// Broker id of the master within a broker set.
pub const MASTER_ID: u64 = 0;

/// Default logical-offset block reserved for each queue moved during remapping.
pub const DEFAULT_BLOCK_SEQ_SIZE: i64 = 10000;

/// Addresses of one broker set (master and slaves share a broker name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerData {
    pub cluster: String,
    pub broker_name: String,
    /// Broker id to address; id 0 is the master
    pub broker_addrs: BTreeMap<u64, String>,
}

impl BrokerData {
    pub fn new(cluster: impl Into<String>, broker_name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            broker_name: broker_name.into(),
            broker_addrs: BTreeMap::new(),
        }
    }

    /// Add an address for the given broker id
    pub fn with_addr(mut self, broker_id: u64, addr: impl Into<String>) -> Self {
        self.broker_addrs.insert(broker_id, addr.into());
        self
    }

    pub fn master_addr(&self) -> Option<&str> {
        self.broker_addrs.get(&MASTER_ID).map(String::as_str)
    }
}

/// Cluster topology as reported by the name-server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// Broker name to broker set
    pub broker_addr_table: BTreeMap<String, BrokerData>,
    /// Cluster name to the broker names it contains
    pub cluster_addr_table: BTreeMap<String, BTreeSet<String>>,
}

impl ClusterInfo {
    /// Register a broker set under its cluster.
    pub fn insert_broker(&mut self, broker: BrokerData) {
        self.cluster_addr_table
            .entry(broker.cluster.clone())
            .or_default()
            .insert(broker.broker_name.clone());
        self.broker_addr_table
            .insert(broker.broker_name.clone(), broker);
    }

    /// Master addresses of every broker set in `cluster`.
    ///
    /// Broker sets without a live master are skipped. An unknown cluster name
    /// is an error, an empty cluster yields an empty set.
    pub fn master_addrs(&self, cluster: &str) -> AdminResult<BTreeSet<String>> {
        let broker_names = self
            .cluster_addr_table
            .get(cluster)
            .ok_or_else(|| AdminError::ClusterNotFound(cluster.to_string()))?;

        Ok(broker_names
            .iter()
            .filter_map(|name| self.broker_addr_table.get(name))
            .filter_map(|broker| broker.master_addr())
            .map(str::to_string)
            .collect())
    }

    /// Whether any broker address, master or slave, contains `fragment`.
    pub fn contains_broker_addr(&self, fragment: &str) -> bool {
        self.broker_addr_table
            .values()
            .flat_map(|broker| broker.broker_addrs.values())
            .any(|addr| addr.contains(fragment))
    }
}

/// A single queue of a topic on one broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: u32,
}

/// Offset range of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicOffset {
    pub min_offset: i64,
    pub max_offset: i64,
    pub last_update_timestamp: i64,
}

/// Per-queue statistics of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatsTable {
    pub offset_table: BTreeMap<MessageQueue, TopicOffset>,
}

impl TopicStatsTable {
    pub fn is_empty(&self) -> bool {
        self.offset_table.is_empty()
    }
}

/// Subscription group settings pushed to each master broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGroupConfig {
    pub group_name: String,
    pub consume_enable: bool,
    pub consume_from_min_enable: bool,
    pub consume_broadcast_enable: bool,
    pub retry_queue_nums: u32,
    pub retry_max_times: u32,
    pub broker_id: u64,
    pub which_broker_when_consume_slowly: u64,
    pub notify_consumer_ids_changed_enable: bool,
}

impl SubscriptionGroupConfig {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            ..Default::default()
        }
    }
}

impl Default for SubscriptionGroupConfig {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            consume_enable: true,
            consume_from_min_enable: true,
            consume_broadcast_enable: true,
            retry_queue_nums: 1,
            retry_max_times: 16,
            broker_id: MASTER_ID,
            which_broker_when_consume_slowly: 1,
            notify_consumer_ids_changed_enable: true,
        }
    }
}

/// Topic settings held by one broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
    pub topic_name: String,
    pub read_queue_nums: u32,
    pub write_queue_nums: u32,
    /// Permission bits, 6 = read + write
    pub perm: u32,
}

impl TopicConfig {
    pub fn new(topic_name: impl Into<String>, queue_nums: u32) -> Self {
        Self {
            topic_name: topic_name.into(),
            read_queue_nums: queue_nums,
            write_queue_nums: queue_nums,
            perm: 6,
        }
    }
}

/// One generation of a logical queue's placement on a physical queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicQueueMappingItem {
    pub gen: u32,
    pub queue_id: u32,
    pub bname: String,
    pub logic_offset: i64,
    pub start_offset: i64,
    /// -1 while the item is the active generation
    pub end_offset: i64,
    pub time_of_start: i64,
    pub time_of_end: i64,
}

/// Logical queues hosted by one broker for a static topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicQueueMappingDetail {
    pub topic: String,
    pub bname: String,
    pub epoch: i64,
    pub total_queues: u32,
    /// Global queue id to its placement history, newest last
    pub hosted_queues: BTreeMap<u32, Vec<LogicQueueMappingItem>>,
}

/// A broker's topic config paired with its static-topic mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfigAndQueueMapping {
    pub topic_config: TopicConfig,
    pub mapping_detail: TopicQueueMappingDetail,
}

impl TopicConfigAndQueueMapping {
    /// Broker names referenced by any generation of any hosted queue.
    pub fn referenced_brokers(&self) -> BTreeSet<String> {
        self.mapping_detail
            .hosted_queues
            .values()
            .flatten()
            .map(|item| item.bname.clone())
            .collect()
    }
}

/// Result of planning a static-topic remapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRemappingDetail {
    pub topic: String,
    pub epoch: i64,
    /// Brokers gaining queues
    pub broker_to_map_in: BTreeSet<String>,
    /// Brokers losing queues
    pub broker_to_map_out: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_broker_cluster() -> ClusterInfo {
        let mut info = ClusterInfo::default();
        info.insert_broker(
            BrokerData::new("DefaultCluster", "broker-a")
                .with_addr(0, "10.0.0.1:10911")
                .with_addr(1, "10.0.0.2:10911"),
        );
        info.insert_broker(BrokerData::new("DefaultCluster", "broker-b").with_addr(1, "10.0.0.4:10911"));
        info.insert_broker(BrokerData::new("OtherCluster", "broker-c").with_addr(0, "10.0.1.1:10911"));
        info
    }

    #[test]
    fn test_master_addrs_skips_brokers_without_master() {
        let info = two_broker_cluster();
        let masters = info.master_addrs("DefaultCluster").unwrap();
        assert_eq!(masters.len(), 1);
        assert!(masters.contains("10.0.0.1:10911"));
    }

    #[test]
    fn test_master_addrs_unknown_cluster() {
        let info = two_broker_cluster();
        let err = info.master_addrs("missing").unwrap_err();
        assert!(matches!(err, AdminError::ClusterNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_contains_broker_addr_matches_slaves() {
        let info = two_broker_cluster();
        assert!(info.contains_broker_addr("10.0.0.4"));
        assert!(info.contains_broker_addr("10.0.1."));
        assert!(!info.contains_broker_addr("192.168."));
    }

    #[test]
    fn test_cluster_info_from_name_server_json() {
        let json = r#"{
            "brokerAddrTable": {
                "broker-a": {
                    "cluster": "DefaultCluster",
                    "brokerName": "broker-a",
                    "brokerAddrs": { "0": "127.0.0.1:10911" }
                }
            },
            "clusterAddrTable": { "DefaultCluster": ["broker-a"] }
        }"#;

        let info: ClusterInfo = serde_json::from_str(json).unwrap();
        assert_eq!(
            info.broker_addr_table["broker-a"].master_addr(),
            Some("127.0.0.1:10911")
        );
        assert_eq!(info.master_addrs("DefaultCluster").unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_group_defaults() {
        let config = SubscriptionGroupConfig::new("cg-test");
        assert_eq!(config.group_name, "cg-test");
        assert!(config.consume_enable);
        assert_eq!(config.retry_max_times, 16);
        assert_eq!(config.broker_id, MASTER_ID);
    }
}
