//! Poll cycle and watch group reconciliation.

pub mod poller;
pub mod render;

use std::collections::HashMap;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use shared::types::{EndpointKey, PollSnapshot, WatchKey};
use crate::display::{DisplayError, DisplayService};
use crate::query::ServerQuery;
use crate::store::StoreError;
use crate::store_manager::StoreHandle;
use self::poller::{PollSettings, StatusCache};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to post status display: {0}")]
    Display(#[from] DisplayError),
    #[error("Monitor is not running")]
    Stopped,
}

/// Outcome of one cycle's reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Groups whose display was updated
    pub refreshed: usize,
    /// Groups whose display could not be resolved yet
    pub pending: usize,
    /// Groups whose edit failed for a transient reason
    pub failed: usize,
    /// Groups removed because their display is gone
    pub pruned: Vec<WatchKey>,
}

/// Owns the status cache and the resolved display handles. Every cycle and
/// every watch group command runs through here, one at a time.
pub struct Monitor<Q, D: DisplayService> {
    store: StoreHandle,
    query: Q,
    display: D,
    settings: PollSettings,
    statuses: StatusCache,
    handles: HashMap<WatchKey, D::Handle>,
    status_tx: watch::Sender<PollSnapshot>,
}

impl<Q, D> Monitor<Q, D>
where
    Q: ServerQuery,
    D: DisplayService,
{
    pub fn new(
        store: StoreHandle,
        query: Q,
        display: D,
        settings: PollSettings,
        status_tx: watch::Sender<PollSnapshot>,
    ) -> Self {
        Self {
            store,
            query,
            display,
            settings,
            statuses: StatusCache::default(),
            handles: HashMap::new(),
            status_tx,
        }
    }

    /// Poll every server once, then refresh every watch group.
    ///
    /// Only a failure to read or persist the configuration is an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let document = self.store.snapshot().await?;

        let elapsed = poller::poll_all(&self.query, &document.servers, &mut self.statuses, &self.settings).await;
        let now = Utc::now();
        self.status_tx
            .send_replace(self.statuses.snapshot(&document.servers, now, elapsed));

        let mut report = CycleReport::default();

        for (key, servers) in &document.active_messages {
            let Some(handle) = self.resolve(*key).await else {
                report.pending += 1;
                continue;
            };

            let content = render::render(servers, &document.servers, &self.statuses, elapsed, now);

            match self.display.edit_display(&handle, &content).await {
                Ok(()) => report.refreshed += 1,
                Err(DisplayError::NotFound) => {
                    tracing::info!("Message appears to be deleted, removing watch group {}", key);
                    report.pruned.push(*key);
                }
                Err(e) => {
                    tracing::warn!("Failed to update watch group {}: {}", key, e);
                    report.failed += 1;
                }
            }
        }

        if !report.pruned.is_empty() {
            for key in &report.pruned {
                self.handles.remove(key);
            }
            self.store
                .remove_watches(report.pruned.clone())
                .await
                .context("Failed to prune watch groups")?;
        }

        tracing::debug!(
            "Cycle done in {:.2}s: {} refreshed, {} pending, {} failed, {} pruned",
            elapsed.as_secs_f64(),
            report.refreshed,
            report.pending,
            report.failed,
            report.pruned.len()
        );

        Ok(report)
    }

    /// Cached handle for a group, fetching it on first use. A failed fetch
    /// is not proof the display is gone; the group stays and is retried.
    async fn resolve(&mut self, key: WatchKey) -> Option<D::Handle> {
        if let Some(handle) = self.handles.get(&key) {
            return Some(handle.clone());
        }

        tracing::info!("Message not yet cached: {}", key);
        match self.display.fetch_display(key).await {
            Ok(handle) => {
                tracing::info!("Resolved message {} in channel {}", key.message_id, key.channel_id);
                self.handles.insert(key, handle.clone());
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch message {}: {}", key, e);
                None
            }
        }
    }

    /// Post a new display in `channel_id` showing `servers` and start
    /// refreshing it every cycle.
    pub async fn create_watch(
        &mut self,
        channel_id: u64,
        servers: Vec<EndpointKey>,
    ) -> Result<WatchKey, MonitorError> {
        let servers = self.store.check_watch(servers).await?;
        let document = self.store.snapshot().await.map_err(StoreError::from)?;

        let content = render::render(&servers, &document.servers, &self.statuses, Duration::ZERO, Utc::now());
        let (key, handle) = self.display.create_display(channel_id, &content).await?;

        if let Err(e) = self.store.add_watch(key, servers).await {
            tracing::error!("Posted display {} but could not record it: {}", key, e);
            return Err(e.into());
        }
        self.handles.insert(key, handle);

        Ok(key)
    }

    pub async fn remove_watch(&mut self, key: WatchKey) -> Result<(), MonitorError> {
        self.store.remove_watch(key).await?;
        self.handles.remove(&key);
        Ok(())
    }

    async fn handle(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::CreateWatch { channel_id, servers, reply } => {
                let _ = reply.send(self.create_watch(channel_id, servers).await);
            }
            MonitorCommand::RemoveWatch { key, reply } => {
                let _ = reply.send(self.remove_watch(key).await);
            }
        }
    }
}

/// Watch group commands, executed between cycles
pub enum MonitorCommand {
    CreateWatch {
        channel_id: u64,
        servers: Vec<EndpointKey>,
        reply: oneshot::Sender<Result<WatchKey, MonitorError>>,
    },
    RemoveWatch {
        key: WatchKey,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
}

/// Handle to submit watch group commands to a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    pub fn channel() -> (Self, mpsc::Receiver<MonitorCommand>) {
        let (tx, rx) = mpsc::channel(64);
        (Self { tx }, rx)
    }

    pub async fn create_watch(&self, channel_id: u64, servers: Vec<EndpointKey>) -> Result<WatchKey, MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::CreateWatch { channel_id, servers, reply })
            .await
            .map_err(|_| MonitorError::Stopped)?;
        rx.await.map_err(|_| MonitorError::Stopped)?
    }

    pub async fn remove_watch(&self, key: WatchKey) -> Result<(), MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::RemoveWatch { key, reply })
            .await
            .map_err(|_| MonitorError::Stopped)?;
        rx.await.map_err(|_| MonitorError::Stopped)?
    }
}

/// Monitor event loop: a cycle on every tick, commands in between.
///
/// The first cycle runs immediately. A cycle that overruns the interval is
/// followed by the next one straight away, never overlapping it. Returns an
/// error if a cycle fails to persist.
pub async fn run<Q, D>(
    mut monitor: Monitor<Q, D>,
    mut commands: mpsc::Receiver<MonitorCommand>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()>
where
    Q: ServerQuery,
    D: DisplayService,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.run_cycle().await?;
            }
            Some(command) = commands.recv() => {
                monitor.handle(command).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Monitor shutting down");
                break;
            }
        }
    }

    Ok(())
}
