//! Common types shared by the mqkit admin helpers.

pub mod error;
pub mod types;

pub use error::{AdminError, AdminResult};
pub use types::{
    BrokerData, ClusterInfo, LogicQueueMappingItem, MessageQueue, SubscriptionGroupConfig,
    TopicConfig, TopicConfigAndQueueMapping, TopicOffset, TopicQueueMappingDetail,
    TopicRemappingDetail, TopicStatsTable, DEFAULT_BLOCK_SEQ_SIZE, MASTER_ID,
};
