//! # Sync Driver
//!
//! Background task deciding when the engine runs.
//!
//! Passes start on a periodic timer, when the network monitor reports a
//! transition to online, and on explicit [`SyncHandle::trigger`] calls (app
//! foregrounded, user pressed "sync now"). Triggers that arrive while a pass
//! runs collapse into one follow-up pass.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::network::{NetworkChangeStream, NetworkInfo, NetworkMonitor};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Foreground,
    NetworkRestored,
    Interval,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Foreground => "foreground",
            Self::NetworkRestored => "network_restored",
            Self::Interval => "interval",
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Period of the automatic trigger
    pub interval: Duration,

    /// Run a pass as soon as the driver starts
    pub sync_on_start: bool,

    /// Skip timer-driven passes while the monitor reports offline
    pub skip_interval_when_offline: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            sync_on_start: true,
            skip_interval_when_offline: true,
        }
    }
}

/// Control handle of a running driver.
pub struct SyncHandle {
    sender: mpsc::Sender<SyncTrigger>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Ask for a pass. Requests made while one is already waiting are merged.
    pub fn trigger(&self, trigger: SyncTrigger) -> Result<()> {
        match self.sender.try_send(trigger) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(SyncError::DriverStopped),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the driver and wait for it. A pass in progress is allowed to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync driver task ended abnormally");
        }
    }
}

/// Spawns the trigger loop.
pub struct SyncDriver;

impl SyncDriver {
    /// Start the loop on the current tokio runtime.
    ///
    /// The loop ends when `cancel` fires or the returned handle is dropped.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        config: DriverConfig,
        network_monitor: Option<Arc<dyn NetworkMonitor>>,
        cancel: CancellationToken,
    ) -> SyncHandle {
        let (sender, receiver) = mpsc::channel(1);
        let task = tokio::spawn(run_loop(
            engine,
            config,
            network_monitor,
            receiver,
            cancel.clone(),
        ));

        SyncHandle {
            sender,
            cancel,
            task,
        }
    }
}

enum Wake {
    Trigger(SyncTrigger),
    Network(Option<NetworkInfo>),
    Stop,
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    config: DriverConfig,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    mut receiver: mpsc::Receiver<SyncTrigger>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !config.sync_on_start {
        // The first tick completes immediately
        ticker.tick().await;
    }

    let (mut online, mut changes) = match &network_monitor {
        Some(monitor) => {
            let online = monitor.is_connected().await;
            let changes = match monitor.subscribe_changes().await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!(error = %e, "Network change subscription failed");
                    None
                }
            };
            (online, changes)
        }
        None => (true, None),
    };

    info!(interval_secs = config.interval.as_secs(), "Sync driver started");

    loop {
        let wake = tokio::select! {
            _ = cancel.cancelled() => Wake::Stop,
            _ = ticker.tick() => Wake::Trigger(SyncTrigger::Interval),
            received = receiver.recv() => match received {
                Some(trigger) => Wake::Trigger(trigger),
                None => Wake::Stop,
            },
            info = next_change(&mut changes) => Wake::Network(info),
        };

        let trigger = match wake {
            Wake::Stop => break,
            Wake::Trigger(SyncTrigger::Interval)
                if config.skip_interval_when_offline && !online =>
            {
                debug!("Offline, skipping scheduled sync");
                continue;
            }
            Wake::Trigger(trigger) => trigger,
            Wake::Network(None) => {
                debug!("Network change stream closed");
                changes = None;
                continue;
            }
            Wake::Network(Some(info)) => {
                let was_online = online;
                online = info.is_online();
                if online && !was_online {
                    SyncTrigger::NetworkRestored
                } else {
                    continue;
                }
            }
        };

        debug!(trigger = trigger.as_str(), "Starting sync pass");
        let report = engine.run_pass().await;
        debug!(
            trigger = trigger.as_str(),
            attempted = report.attempted,
            delivered = report.delivered,
            coalesced = report.coalesced,
            "Sync pass finished"
        );
    }

    info!("Sync driver stopped");
}

async fn next_change(changes: &mut Option<Box<dyn NetworkChangeStream>>) -> Option<NetworkInfo> {
    match changes {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
