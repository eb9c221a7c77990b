use log::debug;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::gateway::{decode_rows, DataGateway, GatewayResult, Query};

struct LoadOutcome<T> {
    generation: u64,
    result: GatewayResult<Vec<T>>,
}

/// Bulk query runner tagged with an activation generation.
///
/// Each `start` bumps the generation and spawns the query. Results that come
/// back for an older generation (the view switched key, refreshed or
/// deactivated in the meantime) are discarded instead of overwriting newer
/// state.
pub struct LoadSlot<T> {
    generation: u64,
    in_flight: bool,
    tx: mpsc::UnboundedSender<LoadOutcome<T>>,
    rx: mpsc::UnboundedReceiver<LoadOutcome<T>>,
}

impl<T> std::fmt::Debug for LoadSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSlot")
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl<T: DeserializeOwned + Send + 'static> LoadSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generation: 0,
            in_flight: false,
            tx,
            rx,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn start(&mut self, gateway: Arc<dyn DataGateway>, query: Query) -> u64 {
        self.generation += 1;
        self.in_flight = true;

        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match gateway.select(&query).await {
                Ok(rows) => decode_rows(rows),
                Err(e) => Err(e),
            };
            if tx.send(LoadOutcome { generation, result }).is_err() {
                debug!("Load for generation {} finished after its view was dropped", generation);
            }
        });

        generation
    }

    /// Invalidates whatever is in flight.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.in_flight = false;
    }

    pub fn try_complete(&mut self) -> Option<GatewayResult<Vec<T>>> {
        while let Ok(outcome) = self.rx.try_recv() {
            if let Some(result) = self.accept(outcome) {
                return Some(result);
            }
        }
        None
    }

    /// Waits for the current generation's result. Returns `None` immediately
    /// when nothing is in flight.
    pub async fn complete(&mut self) -> Option<GatewayResult<Vec<T>>> {
        while self.in_flight {
            let outcome = self.rx.recv().await?;
            if let Some(result) = self.accept(outcome) {
                return Some(result);
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome<T>) -> Option<GatewayResult<Vec<T>>> {
        if !self.in_flight || outcome.generation != self.generation {
            debug!(
                "Discarding stale load result for generation {} (current {})",
                outcome.generation, self.generation
            );
            return None;
        }
        self.in_flight = false;
        Some(outcome.result)
    }
}

impl<T: DeserializeOwned + Send + 'static> Default for LoadSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
