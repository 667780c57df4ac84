//! Periodic synthetic telemetry.
//!
//! On every tick the loop snapshots the connection registry and pushes one
//! fake sensor reading per plant into each connected user's room. Readings
//! are never stored.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::fault::{self, FaultInjector};
use crate::protocol::{PushEvent, Reading};
use crate::registry::ConnectionRegistry;
use crate::store::{Store, StoreError};

pub const TEMPERATURE_RANGE: (f64, f64) = (20.0, 30.0);
pub const HUMIDITY_RANGE: (f64, f64) = (40.0, 60.0);
pub const WATER_LEVEL_RANGE: (u8, u8) = (1, 10);
pub const INSECT_RANGE: (u8, u8) = (0, 10);

/// Draw one reading. Continuous values are rounded to two decimals.
pub fn synthesize_reading<R: Rng + ?Sized>(rng: &mut R) -> Reading {
    Reading {
        temperature: round2(rng.gen_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1)),
        humidity: round2(rng.gen_range(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1)),
        water_level: rng.gen_range(WATER_LEVEL_RANGE.0..=WATER_LEVEL_RANGE.1),
        number_of_insects: rng.gen_range(INSECT_RANGE.0..=INSECT_RANGE.1),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outcome of a single tick, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Users whose tick was suppressed by error mode.
    pub skipped: usize,
    /// Users whose tick failed with an error.
    pub failed: usize,
    /// Readings generated across all users.
    pub readings: usize,
}

/// The telemetry fan-out task and its collaborators.
#[derive(Clone)]
pub struct Telemetry {
    registry: ConnectionRegistry,
    store: Store,
    faults: Arc<dyn FaultInjector>,
}

impl Telemetry {
    pub fn new(registry: ConnectionRegistry, store: Store, faults: Arc<dyn FaultInjector>) -> Self {
        Self {
            registry,
            store,
            faults,
        }
    }

    /// Run the loop on its own task until `cancel` fires.
    ///
    /// The first tick happens one full `period` after spawn.
    pub fn spawn(self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_ms = period.as_millis() as u64, "telemetry loop started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.run_tick().await;
                        tracing::trace!(?report, "telemetry tick complete");
                    }
                }
            }
            tracing::info!("telemetry loop stopped");
        })
    }

    /// Process every connected user once.
    ///
    /// Error mode suppresses a user's whole tick, not individual plants. A
    /// failure for one user is logged and does not affect the others.
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for (user_id, entry) in self.registry.snapshot() {
            if fault::tripped(entry.error_mode, self.faults.as_ref()) {
                tracing::warn!(user_id, "Failed to send data to user; will retry later");
                report.skipped += 1;
                continue;
            }
            match self.publish_for_user(user_id).await {
                Ok(count) => report.readings += count,
                Err(e) => {
                    tracing::error!(user_id, error = %e, "telemetry failed for user");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn publish_for_user(&self, user_id: i64) -> Result<usize, StoreError> {
        let plants = self.store.plants_for_owner(user_id).await?;
        let broker = self.registry.broker();
        let mut rng = rand::thread_rng();
        for plant in &plants {
            let event = PushEvent::UpdatePlant {
                plant_id: plant.id,
                data: synthesize_reading(&mut rng),
            };
            broker.publish(user_id, event);
            tracing::debug!(user_id, plant_id = plant.id, "simulated data sent");
        }
        Ok(plants.len())
    }
}
