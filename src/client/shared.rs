//! Process-wide lazily started client

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{AgentClient, ClientFactory};
use crate::types::Result;

/// Single upstream client shared by every session
///
/// The slot lock is held across the start, so a second caller arriving while
/// a start is in flight waits for that start instead of launching another
/// client. A failed start leaves the slot empty and the next call retries.
#[derive(Debug)]
pub struct SharedClient {
    factory: Arc<dyn ClientFactory>,
    slot: Mutex<Option<Arc<dyn AgentClient>>>,
}

impl SharedClient {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
        }
    }

    /// Get the running client, starting it on first use
    pub async fn get(&self) -> Result<Arc<dyn AgentClient>> {
        let mut slot = self.slot.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let start = std::time::Instant::now();
        tracing::info!("Starting shared agent client");
        match self.factory.start().await {
            Ok(client) => {
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis(),
                    "Shared agent client started"
                );
                *slot = Some(Arc::clone(&client));
                Ok(client)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Shared agent client failed to start, next call will retry"
                );
                Err(e)
            }
        }
    }

    /// Check whether a client is currently running
    pub async fn is_started(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Stop the running client, if any
    ///
    /// Stop errors are logged and swallowed; the slot is always cleared.
    pub async fn stop(&self) {
        let client = self.slot.lock().await.take();
        if let Some(client) = client {
            if let Err(e) = client.stop().await {
                tracing::warn!(error = %e, "Failed to stop shared agent client");
            } else {
                tracing::info!("Shared agent client stopped");
            }
        }
    }
}
