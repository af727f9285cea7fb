use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::client::AtmeexClient;
use crate::normalize::normalize;
use crate::types::{Device, Snapshot};
use crate::Result;

/// Steady-state poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Acceptable cadence for low-priority deployments.
pub const RELAXED_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// Owns the last known-good [`Snapshot`] and reconciles it with each poll.
///
/// A poll failure never clears the snapshot: consumers keep seeing the
/// previous data while the backend is flaky. A device missing from one
/// list response is carried over unchanged instead of being dropped.
/// Snapshots are replaced atomically through a watch channel; readers
/// never observe a half-updated one.
pub struct Coordinator {
    client: Arc<AtmeexClient>,
    tx: watch::Sender<Snapshot>,
}

impl Coordinator {
    pub fn new(client: Arc<AtmeexClient>) -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self { client, tx }
    }

    pub fn api(&self) -> &AtmeexClient {
        &self.client
    }

    /// Latest merged snapshot. Non-blocking.
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot, whether from the
    /// periodic poll or a targeted refresh.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Runs one poll cycle and awaits its outcome. Errors propagate to
    /// the caller; the previous snapshot stays in place on failure.
    pub async fn refresh(&self) -> Result<()> {
        let devices = self.client.list_devices().await?;
        // Read and replace under the channel lock: a concurrently
        // completing targeted refresh cannot slip between them.
        self.tx.send_modify(|snap| {
            *snap = merge(snap, devices);
            debug!(devices = snap.devices.len(), "publishing merged snapshot");
        });
        Ok(())
    }

    /// Fetches one device and replaces only its entry in the current
    /// snapshot, leaving every other device untouched. Used after a write
    /// command to make the change visible without a full poll.
    pub async fn refresh_device(&self, device_id: u64) -> Result<()> {
        let device = self.client.get_device(device_id).await?;
        let state = normalize(&device);

        // Applied to whatever snapshot is current once the fetch is done,
        // under the channel lock: a full poll landing concurrently keeps
        // its updates for every other device.
        self.tx.send_modify(|snap| {
            match snap.devices.iter_mut().position(|d| d.id == device_id) {
                Some(idx) => snap.devices[idx] = device,
                None => snap.devices.push(device),
            }
            snap.states.insert(device_id.to_string(), state);
        });
        Ok(())
    }

    /// Polls forever on a fixed cadence. Ticks never overlap: a tick due
    /// while a poll is still running waits for it. This loop is the single
    /// place poll failures are swallowed; each one is logged and the last
    /// snapshot kept.
    pub async fn run(&self, period: Duration) {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            if let Err(err) = self.refresh().await {
                warn!(error = %err, "poll cycle failed, keeping last snapshot");
            }
        }
    }
}

/// Builds the next snapshot from a fresh device list. Devices present in
/// the previous snapshot but absent from the fetch are carried over with
/// their prior state: continuity takes precedence over freshness.
fn merge(prev: &Snapshot, devices: Vec<Device>) -> Snapshot {
    let mut states = HashMap::with_capacity(devices.len());
    for dev in &devices {
        states.insert(dev.id.to_string(), normalize(dev));
    }

    let mut merged = Snapshot { devices, states };
    for dev in &prev.devices {
        if merged.device(dev.id).is_none() {
            debug!(device_id = dev.id, "device missing from poll, carrying over");
            merged.devices.push(dev.clone());
            if let Some(state) = prev.state(dev.id) {
                merged.states.insert(dev.id.to_string(), state.clone());
            }
        }
    }
    merged
}
