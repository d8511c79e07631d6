//! Status notification: the publish seam the workflow calls after commit.

mod mqtt;

use async_trait::async_trait;
use rfidgate_storage::TagStatus;
use tracing::debug;

use crate::error::NotifyError;

pub use mqtt::{MqttNotifier, MqttSettings};

/// Publishes a tag's resulting status to the well-known topic.
///
/// Fire-and-forget: implementations report failure through the result but
/// never retry, and callers never wait for delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, status: TagStatus) -> Result<(), NotifyError>;
}

/// Notifier used when publishing is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn publish(&self, status: TagStatus) -> Result<(), NotifyError> {
        debug!("notifications disabled, dropping status {}", status);
        Ok(())
    }
}
