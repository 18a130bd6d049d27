use mockall::mock;
use vending_engine::{MessagePublisher, PublishError};

mock! {
    pub Publisher {}
    impl MessagePublisher for Publisher {
        async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
    }
}
