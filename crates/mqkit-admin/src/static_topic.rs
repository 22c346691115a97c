//! Static-topic setup for tests.
//!
//! Both operations are plain sequences of admin and planner calls with no
//! rollback. If a step fails, whatever earlier steps already wrote to the
//! brokers stays written and the error is returned as is.

use mqkit_common::{TopicRemappingDetail, DEFAULT_BLOCK_SEQ_SIZE};
use std::collections::BTreeSet;
use tracing::info;

use crate::client::{BrokerConfigMap, QueueMappingPlanner, StaticTopicAdmin};
use crate::error::{ProvisionError, Result};

/// Create static topic `topic` with `queue_num` global queues spread over
/// `target_brokers`. The topic must not exist on any broker yet.
///
/// Returns the broker config map that was written.
pub async fn create_static_topic<A, P>(
    admin: &A,
    planner: &P,
    topic: &str,
    queue_num: u32,
    target_brokers: &BTreeSet<String>,
) -> Result<BrokerConfigMap>
where
    A: StaticTopicAdmin + ?Sized,
    P: QueueMappingPlanner + ?Sized,
{
    let mut configs = admin.examine_topic_config_all(topic).await?;
    if !configs.is_empty() {
        return Err(ProvisionError::Precondition {
            topic: topic.to_string(),
            reason: format!("already configured on brokers {:?}", configs.keys().collect::<Vec<_>>()),
        });
    }

    planner.create_topic_config_mapping(topic, queue_num, target_brokers, &mut configs)?;
    admin.complete_no_target_brokers(&mut configs).await?;
    admin.update_topic_config_mapping_all(&configs, false).await?;

    info!(topic = %topic, queue_num, brokers = configs.len(), "Static topic created");
    Ok(configs)
}

/// Move the queues of existing static topic `topic` onto `target_brokers`.
///
/// Returns the remapping plan that was applied.
pub async fn remap_static_topic<A, P>(
    admin: &A,
    planner: &P,
    topic: &str,
    target_brokers: &BTreeSet<String>,
) -> Result<TopicRemappingDetail>
where
    A: StaticTopicAdmin + ?Sized,
    P: QueueMappingPlanner + ?Sized,
{
    let mut configs = admin.examine_topic_config_all(topic).await?;
    if configs.is_empty() {
        return Err(ProvisionError::Precondition {
            topic: topic.to_string(),
            reason: "not configured on any broker".to_string(),
        });
    }

    let detail = planner.plan_remapping(topic, &mut configs, target_brokers)?;
    admin.complete_no_target_brokers(&mut configs).await?;
    admin
        .remap_static_topic(
            topic,
            &detail.broker_to_map_in,
            &detail.broker_to_map_out,
            &mut configs,
            DEFAULT_BLOCK_SEQ_SIZE,
            false,
        )
        .await?;

    info!(
        topic = %topic,
        epoch = detail.epoch,
        map_in = ?detail.broker_to_map_in,
        map_out = ?detail.broker_to_map_out,
        "Static topic remapped"
    );
    Ok(detail)
}
