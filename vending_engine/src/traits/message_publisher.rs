use std::sync::Arc;

use crate::traits::PublishError;

/// The outbound half of the message broker.
#[allow(async_fn_in_trait)]
pub trait MessagePublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

impl<P: MessagePublisher> MessagePublisher for Arc<P> {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.as_ref().publish(topic, payload).await
    }
}
