//! Hotplug discovery.
//!
//! One task owns the pending set and the debounce timer. Creation
//! notifications for event nodes are collected into the pending set and
//! opened in a batch once the timer fires; nodes that are not yet readable
//! are carried over into the next batch.

use crate::input::device::{is_event_node, DeviceHandle, DeviceRegistry};
use crate::input::selector::Selector;
use crate::input::watch::{Notification, NotificationKind};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Device notification stream closed")]
    NotificationStreamClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Batching,
}

/// Outcome counts of one pass over the pending set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub accepted: usize,
    pub rejected: usize,
    pub retrying: usize,
    pub dropped: usize,
}

pub struct DiscoveryEngine<R: DeviceRegistry> {
    registry: R,
    selector: Arc<Selector>,
    dir: PathBuf,
    notifications: mpsc::Receiver<Notification>,
    pending: BTreeSet<PathBuf>,
    known: HashSet<PathBuf>,
    attempts: HashMap<PathBuf, u32>,
    deadline: Option<Instant>,
    debounce: Duration,
    max_retries: Option<u32>,
}

impl<R: DeviceRegistry> DiscoveryEngine<R> {
    pub fn new(
        registry: R,
        selector: Arc<Selector>,
        dir: impl Into<PathBuf>,
        notifications: mpsc::Receiver<Notification>,
    ) -> Self {
        Self {
            registry,
            selector,
            dir: dir.into(),
            notifications,
            pending: BTreeSet::new(),
            known: HashSet::new(),
            attempts: HashMap::new(),
            deadline: None,
            debounce: DEFAULT_DEBOUNCE,
            max_retries: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Caps consecutive permission-denied retries per path. `None` retries
    /// forever.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Paths that are already being handled elsewhere. Creation
    /// notifications for them are ignored until they are deleted.
    pub fn with_known_paths<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.known.extend(paths);
        self
    }

    pub fn state(&self) -> DiscoveryState {
        if self.deadline.is_some() {
            DiscoveryState::Batching
        } else {
            DiscoveryState::Idle
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.debounce);
        }
    }

    pub fn handle_notification(&mut self, notification: Notification) {
        let path = self.dir.join(&notification.name);
        match notification.kind {
            NotificationKind::Created if self.known.contains(&path) => {
                tracing::debug!("Ignoring creation of known device node {:?}", path);
            }
            NotificationKind::Created if is_event_node(&notification.name) => {
                tracing::debug!("Device node created: {:?}", path);
                self.attempts.remove(&path);
                self.pending.insert(path);
                self.arm();
            }
            NotificationKind::Created => {
                tracing::trace!("Ignoring non-event node {:?}", path);
            }
            NotificationKind::Deleted => {
                if self.pending.remove(&path) {
                    tracing::debug!("Pending device node removed: {:?}", path);
                }
                self.known.remove(&path);
                self.attempts.remove(&path);
            }
        }
    }

    /// Tries every pending path once. Accepted devices are handed to
    /// `on_accepted`; permission races stay pending for the next pass.
    pub fn drain<F>(&mut self, on_accepted: &mut F) -> DrainReport
    where
        F: FnMut(R::Handle),
    {
        self.deadline = None;
        let mut report = DrainReport::default();
        if self.pending.is_empty() {
            return report;
        }

        let batch = std::mem::take(&mut self.pending);
        let mut retry = BTreeSet::new();

        for path in batch {
            match self.registry.open(&path) {
                Ok(handle) => {
                    self.attempts.remove(&path);
                    if self.selector.matches(handle.info()) {
                        tracing::info!("New device: {}", handle.info());
                        report.accepted += 1;
                        self.known.insert(path);
                        on_accepted(handle);
                    } else {
                        tracing::debug!("Device not selected: {}", handle.info());
                        report.rejected += 1;
                    }
                }
                Err(e) if e.is_permission_race() => {
                    let attempts = self.attempts.entry(path.clone()).or_insert(0);
                    *attempts += 1;
                    match self.max_retries {
                        Some(max) if *attempts > max => {
                            tracing::warn!("Giving up on {:?} after {} attempts: {}", path, attempts, e);
                            self.attempts.remove(&path);
                            report.dropped += 1;
                        }
                        _ => {
                            tracing::debug!("Device {:?} not readable yet, retrying: {}", path, e);
                            retry.insert(path);
                            report.retrying += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    self.attempts.remove(&path);
                    report.dropped += 1;
                }
            }
        }

        self.pending = retry;
        if !self.pending.is_empty() {
            self.arm();
        }
        report
    }

    /// Runs until the notification stream ends, which is an error: there is
    /// no way to resume watching.
    pub async fn run<F>(mut self, mut on_accepted: F) -> Result<(), DiscoveryError>
    where
        F: FnMut(R::Handle),
    {
        tracing::info!("Discovery started for {:?}", self.dir);

        loop {
            let deadline = self.deadline;
            tokio::select! {
                notification = self.notifications.recv() => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        tracing::error!("Device notification stream closed");
                        return Err(DiscoveryError::NotificationStreamClosed);
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let report = self.drain(&mut on_accepted);
                    if report != DrainReport::default() {
                        tracing::debug!(
                            "Drain: {} accepted, {} rejected, {} retrying, {} dropped ({:?}, {} pending)",
                            report.accepted,
                            report.rejected,
                            report.retrying,
                            report.dropped,
                            self.state(),
                            self.pending_len()
                        );
                    }
                }
            }
        }
    }
}
