//! Async access to one [`EquipmentManager`] from many tasks.
//!
//! Driver calls block on serial I/O, so each one runs on tokio's blocking
//! pool. A single mutex around the whole manager serializes commands; there
//! are no field-level locks.

use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::error;

use crate::error::{EquipmentError, EquipmentResult};
use crate::manager::{EquipmentManager, ScaleStatusReport};
use crate::scale::ScaleReading;

#[derive(Clone)]
pub struct SharedEquipment {
    inner: Arc<Mutex<EquipmentManager>>,
}

fn lock(manager: &Mutex<EquipmentManager>) -> MutexGuard<'_, EquipmentManager> {
    // a panic mid-command leaves the driver state readable
    manager.lock().unwrap_or_else(|e| e.into_inner())
}

impl SharedEquipment {
    pub fn new(manager: EquipmentManager) -> Self {
        SharedEquipment {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    async fn run<T, F>(&self, op: F) -> EquipmentResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut EquipmentManager) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&mut *lock(&inner)))
            .await
            .map_err(|e| {
                error!(error = %e, "Equipment worker failed");
                EquipmentError::Worker(e.to_string())
            })
    }

    pub async fn connect(&self) -> EquipmentResult<bool> {
        self.run(|m| m.connect()).await
    }

    pub async fn disconnect(&self) -> EquipmentResult<bool> {
        self.run(|m| m.disconnect()).await
    }

    pub async fn read_weight(&self) -> EquipmentResult<Option<ScaleReading>> {
        self.run(|m| m.read_weight()).await
    }

    pub async fn wait_for_stable_weight(
        &self,
        timeout: Duration,
    ) -> EquipmentResult<Option<ScaleReading>> {
        self.run(move |m| m.wait_for_stable_weight(timeout)).await
    }

    pub async fn tare(&self) -> EquipmentResult<bool> {
        self.run(|m| m.tare()).await
    }

    pub async fn zero(&self) -> EquipmentResult<bool> {
        self.run(|m| m.zero()).await
    }

    pub async fn status(&self) -> EquipmentResult<ScaleStatusReport> {
        self.run(|m| m.status()).await
    }

    /// Last weight without touching the port; waits if a command is running.
    pub async fn last_weight(&self) -> EquipmentResult<Option<Decimal>> {
        self.run(|m| m.last_reading().map(ScaleReading::signed_weight))
            .await
    }
}
