use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, OrderReconciledEvent, OrderRejectedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_reconciled_producer: Vec<EventProducer<OrderReconciledEvent>>,
    pub order_rejected_producer: Vec<EventProducer<OrderRejectedEvent>>,
}

pub struct EventHandlers {
    pub on_order_reconciled: Option<EventHandler<OrderReconciledEvent>>,
    pub on_order_rejected: Option<EventHandler<OrderRejectedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_reconciled = hooks.on_order_reconciled.map(|f| EventHandler::new(buffer_size, f));
        let on_order_rejected = hooks.on_order_rejected.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_reconciled, on_order_rejected }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_reconciled {
            result.order_reconciled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_rejected {
            result.order_rejected_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for every configured handler. Handlers stop once all their producers are dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_reconciled {
            debug!("📬️ Starting order reconciled hook");
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_rejected {
            debug!("📬️ Starting order rejected hook");
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_reconciled: Option<Handler<OrderReconciledEvent>>,
    pub on_order_rejected: Option<Handler<OrderRejectedEvent>>,
}

impl EventHooks {
    pub fn on_order_reconciled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderReconciledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_reconciled = Some(Arc::new(f));
        self
    }

    pub fn on_order_rejected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderRejectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_rejected = Some(Arc::new(f));
        self
    }
}
