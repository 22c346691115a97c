//! In-memory cluster for tests.
//!
//! [`MemoryCluster`] stands in for a name-server and its brokers. It hands out
//! [`MemorySession`]s through [`AdminClientFactory`], delays topic visibility
//! by a configurable propagation delay, and can be told to fail specific
//! calls so tests can drive every error path of the provisioner.

use async_trait::async_trait;
use mqkit_common::{
    AdminError, AdminResult, BrokerData, ClusterInfo, LogicQueueMappingItem, MessageQueue,
    SubscriptionGroupConfig, TopicConfig, TopicConfigAndQueueMapping, TopicOffset,
    TopicQueueMappingDetail, TopicRemappingDetail, TopicStatsTable,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::{
    AdminClientFactory, AdminSession, BrokerConfigMap, QueueMappingPlanner, SessionOptions,
    StaticTopicAdmin,
};

/// Response code the fake brokers use for injected failures.
pub const SYSTEM_ERROR: i32 = 1;

struct TopicState {
    cluster: String,
    queue_num: u32,
    visible_at: Instant,
}

#[derive(Default)]
struct Faults {
    fail_session_start: bool,
    reject_topic_create: bool,
    stats_failures: u32,
    fail_cluster_info: bool,
    failing_group_addrs: BTreeSet<String>,
    fail_persist_on: Option<String>,
}

#[derive(Default)]
struct Counters {
    sessions_started: usize,
    sessions_shut_down: usize,
    topic_create_requests: usize,
    subscription_attempts: Vec<String>,
}

#[derive(Default)]
struct ClusterState {
    topology: ClusterInfo,
    propagation_delay: Duration,
    topics: HashMap<String, TopicState>,
    /// Broker address to group name to config
    groups: HashMap<String, BTreeMap<String, SubscriptionGroupConfig>>,
    /// Broker name to topic to static-topic config
    static_configs: HashMap<String, HashMap<String, TopicConfigAndQueueMapping>>,
    faults: Faults,
    counters: Counters,
}

impl ClusterState {
    fn is_known_addr(&self, addr: &str) -> bool {
        self.topology
            .broker_addr_table
            .values()
            .any(|b| b.broker_addrs.values().any(|a| a == addr))
    }

    fn write_static_config(
        &mut self,
        broker: &str,
        entry: &TopicConfigAndQueueMapping,
    ) -> AdminResult<()> {
        if self.faults.fail_persist_on.as_deref() == Some(broker) {
            return Err(AdminError::Broker {
                code: SYSTEM_ERROR,
                remark: format!("update topic config failed on {}", broker),
            });
        }
        if !self.topology.broker_addr_table.contains_key(broker) {
            return Err(AdminError::BrokerNotFound(broker.to_string()));
        }
        self.static_configs
            .entry(broker.to_string())
            .or_default()
            .insert(entry.topic_config.topic_name.clone(), entry.clone());
        Ok(())
    }
}

/// Shared handle to a fake name-server and its brokers.
#[derive(Clone)]
pub struct MemoryCluster {
    namesrv_addr: String,
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    /// An empty cluster reachable at `namesrv_addr`.
    pub fn new(namesrv_addr: impl Into<String>) -> Self {
        Self {
            namesrv_addr: namesrv_addr.into(),
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    pub fn namesrv_addr(&self) -> &str {
        &self.namesrv_addr
    }

    /// Register a broker set.
    pub fn add_broker(&self, broker: BrokerData) -> &Self {
        self.state.lock().topology.insert_broker(broker);
        self
    }

    /// Delay between a topic create request and the topic showing up in stats.
    pub fn set_propagation_delay(&self, delay: Duration) {
        self.state.lock().propagation_delay = delay;
    }

    /// Make `topic` exist and be visible right away, as if created by an earlier run.
    pub fn seed_topic(&self, cluster: &str, topic: &str, queue_num: u32) {
        self.state.lock().topics.insert(
            topic.to_string(),
            TopicState {
                cluster: cluster.to_string(),
                queue_num,
                visible_at: Instant::now(),
            },
        );
    }

    pub fn fail_session_start(&self, fail: bool) {
        self.state.lock().faults.fail_session_start = fail;
    }

    /// Reject create-topic requests. Already existing topics stay visible.
    pub fn reject_topic_creation(&self, reject: bool) {
        self.state.lock().faults.reject_topic_create = reject;
    }

    /// Fail the next `count` topic stats queries.
    pub fn fail_stats_queries(&self, count: u32) {
        self.state.lock().faults.stats_failures = count;
    }

    pub fn fail_cluster_info(&self, fail: bool) {
        self.state.lock().faults.fail_cluster_info = fail;
    }

    /// Refuse subscription-group updates sent to broker address `addr`.
    pub fn fail_subscription_on(&self, addr: impl Into<String>) {
        self.state.lock().faults.failing_group_addrs.insert(addr.into());
    }

    /// Fail static-topic config writes to broker `broker`.
    pub fn fail_persist_on_broker(&self, broker: Option<&str>) {
        self.state.lock().faults.fail_persist_on = broker.map(str::to_string);
    }

    pub fn sessions_started(&self) -> usize {
        self.state.lock().counters.sessions_started
    }

    pub fn sessions_shut_down(&self) -> usize {
        self.state.lock().counters.sessions_shut_down
    }

    pub fn topic_create_requests(&self) -> usize {
        self.state.lock().counters.topic_create_requests
    }

    /// Broker addresses subscription updates were sent to, in order.
    pub fn subscription_attempts(&self) -> Vec<String> {
        self.state.lock().counters.subscription_attempts.clone()
    }

    pub fn subscription_group(&self, addr: &str, group: &str) -> Option<SubscriptionGroupConfig> {
        self.state
            .lock()
            .groups
            .get(addr)
            .and_then(|groups| groups.get(group))
            .cloned()
    }

    /// Static-topic config of `topic` as persisted on `broker`.
    pub fn static_config(&self, broker: &str, topic: &str) -> Option<TopicConfigAndQueueMapping> {
        self.state
            .lock()
            .static_configs
            .get(broker)
            .and_then(|topics| topics.get(topic))
            .cloned()
    }
}

impl AdminClientFactory for MemoryCluster {
    type Session = MemorySession;

    fn create(&self, options: SessionOptions) -> MemorySession {
        MemorySession {
            cluster: self.clone(),
            options,
            started: false,
        }
    }
}

/// Admin session against a [`MemoryCluster`].
pub struct MemorySession {
    cluster: MemoryCluster,
    options: SessionOptions,
    started: bool,
}

impl MemorySession {
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn state(&self) -> AdminResult<parking_lot::MutexGuard<'_, ClusterState>> {
        if !self.started {
            return Err(AdminError::NotStarted);
        }
        Ok(self.cluster.state.lock())
    }
}

#[async_trait]
impl AdminSession for MemorySession {
    async fn start(&mut self) -> AdminResult<()> {
        if self.options.namesrv_addr != self.cluster.namesrv_addr {
            return Err(AdminError::Connection(format!(
                "connect to {} failed",
                self.options.namesrv_addr
            )));
        }
        let mut state = self.cluster.state.lock();
        if state.faults.fail_session_start {
            return Err(AdminError::Connection(format!(
                "connect to {} refused",
                self.options.namesrv_addr
            )));
        }
        state.counters.sessions_started += 1;
        self.started = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> AdminResult<()> {
        self.cluster.state.lock().counters.sessions_shut_down += 1;
        self.started = false;
        Ok(())
    }

    async fn create_topic(&self, cluster: &str, topic: &str, queue_num: u32) -> AdminResult<()> {
        let mut state = self.state()?;
        state.counters.topic_create_requests += 1;

        if state.faults.reject_topic_create {
            return Err(AdminError::Broker {
                code: SYSTEM_ERROR,
                remark: format!("create topic {} rejected", topic),
            });
        }
        if !state.topology.cluster_addr_table.contains_key(cluster) {
            return Err(AdminError::ClusterNotFound(cluster.to_string()));
        }

        let visible_at = Instant::now() + state.propagation_delay;
        let entry = state.topics.entry(topic.to_string()).or_insert(TopicState {
            cluster: cluster.to_string(),
            queue_num,
            visible_at,
        });
        entry.queue_num = queue_num;
        Ok(())
    }

    async fn create_and_update_subscription_group_config(
        &self,
        addr: &str,
        config: &SubscriptionGroupConfig,
    ) -> AdminResult<()> {
        let mut state = self.state()?;
        state.counters.subscription_attempts.push(addr.to_string());

        if state.faults.failing_group_addrs.contains(addr) {
            return Err(AdminError::Connection(format!("connect to {} failed", addr)));
        }
        if !state.is_known_addr(addr) {
            return Err(AdminError::BrokerNotFound(addr.to_string()));
        }

        state
            .groups
            .entry(addr.to_string())
            .or_default()
            .insert(config.group_name.clone(), config.clone());
        Ok(())
    }

    async fn examine_topic_stats(&self, topic: &str) -> AdminResult<TopicStatsTable> {
        let mut state = self.state()?;
        if state.faults.stats_failures > 0 {
            state.faults.stats_failures -= 1;
            return Err(AdminError::Connection("examine topic stats timed out".to_string()));
        }

        let now = Instant::now();
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut stats = TopicStatsTable::default();
        let mut queue = |broker_name: &str, queue_id: u32| {
            let mq = MessageQueue {
                topic: topic.to_string(),
                broker_name: broker_name.to_string(),
                queue_id,
            };
            let offset = TopicOffset {
                min_offset: 0,
                max_offset: 0,
                last_update_timestamp: timestamp,
            };
            stats.offset_table.insert(mq, offset);
        };

        if let Some(topic_state) = state.topics.get(topic) {
            if now < topic_state.visible_at {
                return Err(AdminError::TopicNotFound(topic.to_string()));
            }
            let brokers = state
                .topology
                .cluster_addr_table
                .get(&topic_state.cluster)
                .cloned()
                .unwrap_or_default();
            for broker_name in brokers {
                for queue_id in 0..topic_state.queue_num {
                    queue(broker_name.as_str(), queue_id);
                }
            }
            return Ok(stats);
        }

        let mut found = false;
        for (broker_name, topics) in &state.static_configs {
            if let Some(entry) = topics.get(topic) {
                found = true;
                for queue_id in 0..entry.topic_config.write_queue_nums {
                    queue(broker_name.as_str(), queue_id);
                }
            }
        }
        if found {
            Ok(stats)
        } else {
            Err(AdminError::TopicNotFound(topic.to_string()))
        }
    }

    async fn examine_broker_cluster_info(&self) -> AdminResult<ClusterInfo> {
        let state = self.state()?;
        if state.faults.fail_cluster_info {
            return Err(AdminError::Broker {
                code: SYSTEM_ERROR,
                remark: "get broker cluster info failed".to_string(),
            });
        }
        Ok(state.topology.clone())
    }
}

fn check_consistent(configs: &BrokerConfigMap, force: bool) -> AdminResult<()> {
    if force {
        return Ok(());
    }
    let mut entries = configs.values().map(|e| &e.mapping_detail);
    let Some(first) = entries.next() else {
        return Ok(());
    };
    for detail in entries {
        if detail.epoch != first.epoch || detail.total_queues != first.total_queues {
            return Err(AdminError::Mapping(format!(
                "inconsistent mapping: {} has epoch {}/{} queues, {} has epoch {}/{} queues",
                first.bname, first.epoch, first.total_queues, detail.bname, detail.epoch, detail.total_queues
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl StaticTopicAdmin for MemorySession {
    async fn examine_topic_config_all(&self, topic: &str) -> AdminResult<BrokerConfigMap> {
        let state = self.state()?;
        Ok(state
            .static_configs
            .iter()
            .filter_map(|(broker, topics)| topics.get(topic).map(|e| (broker.clone(), e.clone())))
            .collect())
    }

    async fn complete_no_target_brokers(&self, configs: &mut BrokerConfigMap) -> AdminResult<()> {
        let state = self.state()?;
        let Some(template) = configs.values().next().map(|e| e.mapping_detail.clone()) else {
            return Ok(());
        };

        let referenced: BTreeSet<String> = configs.values().flat_map(|e| e.referenced_brokers()).collect();
        for broker in referenced {
            if configs.contains_key(&broker) {
                continue;
            }
            if !state.topology.broker_addr_table.contains_key(&broker) {
                return Err(AdminError::BrokerNotFound(broker));
            }
            configs.insert(
                broker.clone(),
                TopicConfigAndQueueMapping {
                    topic_config: TopicConfig::new(template.topic.clone(), 0),
                    mapping_detail: TopicQueueMappingDetail {
                        topic: template.topic.clone(),
                        bname: broker,
                        epoch: template.epoch,
                        total_queues: template.total_queues,
                        hosted_queues: BTreeMap::new(),
                    },
                },
            );
        }
        Ok(())
    }

    async fn update_topic_config_mapping_all(
        &self,
        configs: &BrokerConfigMap,
        force: bool,
    ) -> AdminResult<()> {
        check_consistent(configs, force)?;
        let mut state = self.state()?;
        for (broker, entry) in configs {
            state.write_static_config(broker, entry)?;
        }
        Ok(())
    }

    async fn remap_static_topic(
        &self,
        topic: &str,
        broker_to_map_in: &BTreeSet<String>,
        broker_to_map_out: &BTreeSet<String>,
        configs: &mut BrokerConfigMap,
        block_seq_size: i64,
        force: bool,
    ) -> AdminResult<()> {
        check_consistent(configs, force)?;

        // New generations continue one block past the previous generation.
        for entry in configs.values_mut() {
            for items in entry.mapping_detail.hosted_queues.values_mut() {
                let n = items.len();
                if n >= 2 && items[n - 1].logic_offset < 0 {
                    items[n - 1].logic_offset = items[n - 2].logic_offset + block_seq_size;
                }
            }
        }

        let order = broker_to_map_in
            .iter()
            .chain(broker_to_map_out.iter())
            .chain(configs.keys().filter(|b| {
                !broker_to_map_in.contains(*b) && !broker_to_map_out.contains(*b)
            }));

        let mut state = self.state()?;
        for broker in order {
            let entry = configs.get(broker).ok_or_else(|| {
                AdminError::Mapping(format!("no config for broker {} of topic {}", broker, topic))
            })?;
            state.write_static_config(broker, entry)?;
        }
        Ok(())
    }
}

/// Spreads global queues over target brokers in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinPlanner;

fn empty_mapping(topic: &str, broker: &str, epoch: i64, total_queues: u32) -> TopicConfigAndQueueMapping {
    TopicConfigAndQueueMapping {
        topic_config: TopicConfig::new(topic, 0),
        mapping_detail: TopicQueueMappingDetail {
            topic: topic.to_string(),
            bname: broker.to_string(),
            epoch,
            total_queues,
            hosted_queues: BTreeMap::new(),
        },
    }
}

impl QueueMappingPlanner for RoundRobinPlanner {
    fn create_topic_config_mapping(
        &self,
        topic: &str,
        queue_num: u32,
        targets: &BTreeSet<String>,
        configs: &mut BrokerConfigMap,
    ) -> AdminResult<()> {
        if targets.is_empty() {
            return Err(AdminError::Mapping(format!("no target brokers for topic {}", topic)));
        }
        if queue_num == 0 {
            return Err(AdminError::Mapping(format!("topic {} needs at least one queue", topic)));
        }

        let epoch = chrono::Utc::now().timestamp_millis();
        let targets: Vec<&String> = targets.iter().collect();
        for global_id in 0..queue_num {
            let broker = targets[global_id as usize % targets.len()];
            let entry = configs
                .entry(broker.clone())
                .or_insert_with(|| empty_mapping(topic, broker, epoch, queue_num));

            let queue_id = entry.mapping_detail.hosted_queues.len() as u32;
            entry.mapping_detail.hosted_queues.insert(
                global_id,
                vec![LogicQueueMappingItem {
                    gen: 0,
                    queue_id,
                    bname: broker.clone(),
                    logic_offset: 0,
                    start_offset: 0,
                    end_offset: -1,
                    time_of_start: -1,
                    time_of_end: -1,
                }],
            );
            entry.topic_config.read_queue_nums = queue_id + 1;
            entry.topic_config.write_queue_nums = queue_id + 1;
        }
        Ok(())
    }

    fn plan_remapping(
        &self,
        topic: &str,
        configs: &mut BrokerConfigMap,
        targets: &BTreeSet<String>,
    ) -> AdminResult<TopicRemappingDetail> {
        if targets.is_empty() {
            return Err(AdminError::Mapping(format!("no target brokers for topic {}", topic)));
        }
        let Some(total_queues) = configs.values().map(|e| e.mapping_detail.total_queues).max() else {
            return Err(AdminError::Mapping(format!("topic {} has no mapping", topic)));
        };
        let epoch = configs
            .values()
            .map(|e| e.mapping_detail.epoch)
            .max()
            .unwrap_or(0)
            + 1;

        for broker in targets {
            configs
                .entry(broker.clone())
                .or_insert_with(|| empty_mapping(topic, broker, epoch, total_queues));
        }

        let mut moving = Vec::new();
        for (broker, entry) in configs.iter_mut() {
            if targets.contains(broker) {
                continue;
            }
            let hosted = std::mem::take(&mut entry.mapping_detail.hosted_queues);
            moving.extend(hosted.into_iter().map(|(gid, items)| (gid, broker.clone(), items)));
        }
        moving.sort_by_key(|(gid, _, _)| *gid);

        let mut detail = TopicRemappingDetail {
            topic: topic.to_string(),
            epoch,
            ..Default::default()
        };

        for (global_id, from, mut items) in moving {
            let target = targets
                .iter()
                .min_by_key(|b| configs.get(*b).map_or(0, |e| e.mapping_detail.hosted_queues.len()))
                .cloned()
                .ok_or_else(|| AdminError::Mapping(format!("no target brokers for topic {}", topic)))?;
            let entry = configs
                .get_mut(&target)
                .ok_or_else(|| AdminError::Mapping(format!("no config for broker {}", target)))?;

            let queue_id = entry.topic_config.write_queue_nums;
            let gen = items.last().map_or(0, |item| item.gen + 1);
            items.push(LogicQueueMappingItem {
                gen,
                queue_id,
                bname: target.clone(),
                logic_offset: -1,
                start_offset: 0,
                end_offset: -1,
                time_of_start: -1,
                time_of_end: -1,
            });
            entry.mapping_detail.hosted_queues.insert(global_id, items);
            entry.topic_config.read_queue_nums = queue_id + 1;
            entry.topic_config.write_queue_nums = queue_id + 1;

            detail.broker_to_map_in.insert(target);
            detail.broker_to_map_out.insert(from);
        }

        for entry in configs.values_mut() {
            entry.mapping_detail.epoch = epoch;
        }
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> MemoryCluster {
        let cluster = MemoryCluster::new("127.0.0.1:9876");
        cluster
            .add_broker(BrokerData::new("DefaultCluster", "broker-a").with_addr(0, "127.0.0.1:10911"))
            .add_broker(BrokerData::new("DefaultCluster", "broker-b").with_addr(0, "127.0.0.1:10921"));
        cluster
    }

    fn options(addr: &str) -> SessionOptions {
        SessionOptions {
            namesrv_addr: addr.to_string(),
            instance_name: "test".to_string(),
            rpc_timeout: Duration::from_secs(3),
        }
    }

    fn targets(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_session_bound_to_namesrv() {
        let cluster = cluster();
        let mut wrong = cluster.create(options("10.9.9.9:9876"));
        assert!(matches!(wrong.start().await, Err(AdminError::Connection(_))));

        let mut session = cluster.create(options(cluster.namesrv_addr()));
        assert_eq!(session.options().instance_name, "test");
        assert!(matches!(
            session.examine_broker_cluster_info().await,
            Err(AdminError::NotStarted)
        ));
        session.start().await.unwrap();
        assert_eq!(cluster.sessions_started(), 1);
        assert!(session.examine_broker_cluster_info().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_visible_after_propagation_delay() {
        let cluster = cluster();
        cluster.set_propagation_delay(Duration::from_millis(300));
        let mut session = cluster.create(options("127.0.0.1:9876"));
        session.start().await.unwrap();

        session.create_topic("DefaultCluster", "orders", 4).await.unwrap();
        assert!(matches!(
            session.examine_topic_stats("orders").await,
            Err(AdminError::TopicNotFound(_))
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let stats = session.examine_topic_stats("orders").await.unwrap();
        assert_eq!(stats.offset_table.len(), 8);
    }

    #[tokio::test]
    async fn test_create_topic_unknown_cluster() {
        let cluster = cluster();
        let mut session = cluster.create(options("127.0.0.1:9876"));
        session.start().await.unwrap();

        let err = session.create_topic("NoSuchCluster", "orders", 4).await.unwrap_err();
        assert!(matches!(err, AdminError::ClusterNotFound(_)));
    }

    #[tokio::test]
    async fn test_default_master_lookup() {
        let cluster = cluster();
        let mut session = cluster.create(options("127.0.0.1:9876"));
        session.start().await.unwrap();

        let masters = session.fetch_master_addrs_by_cluster("DefaultCluster").await.unwrap();
        assert_eq!(masters, targets(&["127.0.0.1:10911", "127.0.0.1:10921"]));
    }

    #[test]
    fn test_round_robin_mapping() {
        let mut configs = BrokerConfigMap::new();
        RoundRobinPlanner
            .create_topic_config_mapping("static", 5, &targets(&["broker-a", "broker-b"]), &mut configs)
            .unwrap();

        let a = &configs["broker-a"];
        let b = &configs["broker-b"];
        assert_eq!(a.topic_config.write_queue_nums, 3);
        assert_eq!(b.topic_config.write_queue_nums, 2);
        assert_eq!(a.mapping_detail.hosted_queues.keys().copied().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(b.mapping_detail.hosted_queues[&3][0].queue_id, 1);
        assert_eq!(a.mapping_detail.epoch, b.mapping_detail.epoch);
    }

    #[test]
    fn test_round_robin_requires_targets() {
        let mut configs = BrokerConfigMap::new();
        let err = RoundRobinPlanner
            .create_topic_config_mapping("static", 4, &BTreeSet::new(), &mut configs)
            .unwrap_err();
        assert!(matches!(err, AdminError::Mapping(_)));
        assert!(configs.is_empty());
    }

    #[test]
    fn test_plan_remapping_moves_queues_off_removed_broker() {
        let mut configs = BrokerConfigMap::new();
        RoundRobinPlanner
            .create_topic_config_mapping("static", 4, &targets(&["broker-a", "broker-b"]), &mut configs)
            .unwrap();
        let old_epoch = configs["broker-a"].mapping_detail.epoch;

        let detail = RoundRobinPlanner
            .plan_remapping("static", &mut configs, &targets(&["broker-b", "broker-c"]))
            .unwrap();

        assert_eq!(detail.broker_to_map_out, targets(&["broker-a"]));
        assert_eq!(detail.broker_to_map_in, targets(&["broker-c"]));
        assert!(detail.epoch > old_epoch);
        assert!(configs["broker-a"].mapping_detail.hosted_queues.is_empty());

        let moved = &configs["broker-c"].mapping_detail.hosted_queues[&0];
        assert_eq!(moved.len(), 2);
        assert_eq!(moved[0].bname, "broker-a");
        assert_eq!(moved[1].bname, "broker-c");
        assert_eq!(moved[1].gen, 1);
        assert!(configs.values().all(|e| e.mapping_detail.epoch == detail.epoch));
    }
}
