//! Inventory change-event fan-out.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tenancy_model::InventoryEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TenancyError};

/// Receives every inventory change notification.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_event(&self, event: &InventoryEvent) -> Result<()>;
}

/// Delivers events from a single inbound stream to every registered handler,
/// one handler at a time in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("EventDispatcher")
            .field("handlers", &names)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        debug!(target: "tenancy::dispatcher", handler = handler.name(), "registered event handler");
        self.handlers.push(handler);
    }

    /// Runs until `shutdown` fires (`Ok`) or the source closes
    /// (`EventSourceClosed`, which the process treats as fatal).
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        mut source: mpsc::UnboundedReceiver<InventoryEvent>,
    ) -> Result<()> {
        info!(target: "tenancy::dispatcher", handlers = self.handlers.len(), "event dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(target: "tenancy::dispatcher", "event dispatcher shutting down");
                    return Ok(());
                }
                event = source.recv() => match event {
                    Some(event) => self.dispatch(&event).await,
                    None => {
                        return Err(TenancyError::EventSourceClosed(
                            "inventory event stream closed".into(),
                        ));
                    }
                }
            }
        }
    }

    async fn dispatch(&self, event: &InventoryEvent) {
        debug!(
            target: "tenancy::dispatcher",
            tenant_id = %event.tenant_id,
            resource_kind = %event.resource_kind,
            resource_id = %event.resource_id,
            event = %event.kind,
            "dispatching inventory event"
        );
        for handler in &self.handlers {
            if let Err(err) = handler.handle_event(event).await {
                warn!(
                    target: "tenancy::dispatcher",
                    handler = handler.name(),
                    tenant_id = %event.tenant_id,
                    resource_kind = %event.resource_kind,
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }
}
