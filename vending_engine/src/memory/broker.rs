use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
    PoisonError,
};

use chrono::Utc;
use log::*;

use crate::{
    traits::{MessagePublisher, PublishError},
    vm_types::BrokerMessage,
};

/// A publisher that keeps everything it is given. Messages can be drained and fed back into a pipeline to simulate a
/// round trip through a real broker.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    messages: Mutex<Vec<BrokerMessage>>,
    offline: AtomicBool,
}

impl MemoryBroker {
    /// While offline, every publish fails with [`PublishError::NotConnected`].
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Every message published so far, oldest first.
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The payloads published on a topic, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published().into_iter().filter(|m| m.topic == topic).map(|m| m.payload_str()).collect()
    }

    /// Removes and returns every message published so far.
    pub fn drain(&self) -> Vec<BrokerMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MessagePublisher for MemoryBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected("the in-memory broker is offline".into()));
        }
        trace!("📡️ [memory] {topic}: {} bytes", payload.len());
        let message = BrokerMessage::new(topic, payload, Utc::now());
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).push(message);
        Ok(())
    }
}
