use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, TimeZone, Utc};
use cucumber::World;
use log::*;
use tempfile::TempDir;
use vending_engine::{
    events::EventProducers,
    memory::MemoryBroker,
    vm_types::{BrokerMessage, MachineId, ProductId, UserId},
    PipelineConfig,
    Resolution,
    SqliteStore,
    VendingPipeline,
};

use crate::support::prepare_env::prepare_test_env;

#[derive(Default, Debug, World)]
pub struct VendingWorld {
    pub system: Option<VendingSystem>,
}

#[derive(Debug)]
pub struct VendingSystem {
    pub dir: TempDir,
    pub pipeline: VendingPipeline<SqliteStore, MemoryBroker>,
    pub broker: Arc<MemoryBroker>,
    pub users: HashMap<String, UserId>,
    pub products: HashMap<String, ProductId>,
    pub machines: HashMap<String, MachineId>,
    pub resolutions: HashMap<String, Vec<Resolution>>,
}

impl VendingWorld {
    pub fn system(&mut self) -> &mut VendingSystem {
        self.system.as_mut().expect("Vending system not initialised")
    }
}

/// Scenario times are given in seconds from this instant.
pub fn scenario_time(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

impl VendingSystem {
    pub async fn new() -> Self {
        let (store, dir) = prepare_test_env(1).await;
        let broker = Arc::new(MemoryBroker::default());
        let pipeline =
            VendingPipeline::new(PipelineConfig::default(), store, Arc::clone(&broker), EventProducers::default())
                .expect("Error creating pipeline");
        debug!("🚀️ Created vending system in {}", dir.path().display());
        Self {
            dir,
            pipeline,
            broker,
            users: HashMap::new(),
            products: HashMap::new(),
            machines: HashMap::new(),
            resolutions: HashMap::new(),
        }
    }

    pub fn user(&self, name: &str) -> UserId {
        *self.users.get(name).unwrap_or_else(|| panic!("Unknown user {name}"))
    }

    pub fn product(&self, name: &str) -> ProductId {
        *self.products.get(name).unwrap_or_else(|| panic!("Unknown product {name}"))
    }

    pub fn machine(&self, code: &str) -> MachineId {
        *self.machines.get(code).unwrap_or_else(|| panic!("Unknown machine {code}"))
    }

    /// Feeds a message into the pipeline, recording the resolution if it was an order intent.
    pub async fn deliver(&mut self, msg: BrokerMessage) {
        let token = msg.topic.rsplit('/').next().unwrap_or_default().to_string();
        match self.pipeline.process(msg).await {
            Ok(Some(resolution)) => self.resolutions.entry(token).or_default().push(resolution),
            Ok(None) => {},
            Err(e) => info!("🚀️ Message dropped. {e}"),
        }
    }

    /// Delivers everything published so far back into the pipeline, until nothing new is published.
    pub async fn flush_broker(&mut self) {
        loop {
            let messages = self.broker.drain();
            if messages.is_empty() {
                break;
            }
            for msg in messages {
                self.deliver(msg).await;
            }
        }
    }

    pub fn last_resolution(&self, token: &str) -> &Resolution {
        self.resolutions
            .get(token)
            .and_then(|r| r.last())
            .unwrap_or_else(|| panic!("Intent {token} has not been resolved"))
    }
}
