//! Synchronous-looking setup helpers for broker integration tests.
//!
//! A [`Provisioner`] creates topics and subscription groups through an admin
//! client and then polls until the change is observable, so a test can go on
//! as soon as the cluster has caught up. The admin client sits behind the
//! traits in [`client`]; [`memory::MemoryCluster`] implements them in memory.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod poll;
pub mod provisioner;
pub mod static_topic;
pub mod teardown;

pub use client::{
    AdminClientFactory, AdminSession, BrokerConfigMap, QueueMappingPlanner, SessionOptions,
    StaticTopicAdmin,
};
pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use poll::{poll_until, PollOutcome, PollSchedule, MIN_POLL_INTERVAL};
pub use provisioner::{
    Provisioner, RequestStatus, SubscriptionProvision, TargetOutcome, TopicProvision,
};
pub use static_topic::{create_static_topic, remap_static_topic};
