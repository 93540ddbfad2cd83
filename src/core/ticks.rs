//! Tick sources driving simulated progress.
//!
//! The orchestrator only asks a [`TickSource`] to wait for the next tick, so
//! tests can swap the wall clock for [`ManualTicks`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uplift_core::models::settings::SimulationSettings;

#[async_trait]
pub trait TickSource: Send + Sync {
    async fn tick(&self);
}

/// Fires once per `period` for each waiter.
pub struct IntervalTicks {
    period: Duration,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn tick(&self) {
        tokio::time::sleep(self.period).await;
    }
}

/// Never fires. Used when simulated progress is disabled.
pub struct NeverTicks;

#[async_trait]
impl TickSource for NeverTicks {
    async fn tick(&self) {
        std::future::pending::<()>().await;
    }
}

/// Fires only when [`advance`](ManualTicks::advance) is called.
#[derive(Default)]
pub struct ManualTicks {
    notify: Notify,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes every task currently waiting for a tick.
    pub fn advance(&self) {
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl TickSource for ManualTicks {
    async fn tick(&self) {
        self.notify.notified().await;
    }
}

pub fn ticks_from_settings(settings: &SimulationSettings) -> Box<dyn TickSource> {
    if settings.tick_interval_ms == 0 {
        Box::new(NeverTicks)
    } else {
        Box::new(IntervalTicks::new(Duration::from_millis(
            settings.tick_interval_ms,
        )))
    }
}

/// Shape of the perceived-progress curve while no authoritative signal exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSimulation {
    pub max_increment: f64,
    pub cap_percent: f64,
}

impl ProgressSimulation {
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            max_increment: settings.max_increment.max(0.0),
            cap_percent: settings.cap_percent.clamp(0.0, 99.0),
        }
    }

    pub fn next_increment(&self) -> f64 {
        rand::random::<f64>() * self.max_increment
    }
}

impl Default for ProgressSimulation {
    fn default() -> Self {
        Self::from_settings(&SimulationSettings::default())
    }
}
