//! Directory change notifications for the device directory.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    InitFailed(#[from] notify::Error),
    #[error("Cannot watch {path:?}: {source}")]
    PathWatchFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Created,
    Deleted,
}

/// A change to one entry of the watched directory, by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub name: String,
}

impl Notification {
    /// Translates a raw watcher event; anything but creation or removal
    /// yields nothing.
    pub fn from_event(event: &Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => NotificationKind::Created,
            EventKind::Remove(_) => NotificationKind::Deleted,
            _ => return Vec::new(),
        };
        event
            .paths
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .map(|name| Notification {
                kind,
                name: name.to_string(),
            })
            .collect()
    }
}

/// Keeps the underlying watcher alive. Dropping it ends the notification
/// stream.
pub struct DeviceWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DeviceWatcher {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Watches `dir` non-recursively and forwards creations and deletions.
pub fn watch_directory(
    dir: &Path,
) -> Result<(DeviceWatcher, mpsc::Receiver<Notification>), WatchError> {
    let (tx, rx) = mpsc::channel(100);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for notification in Notification::from_event(&event) {
                let _ = tx.blocking_send(notification);
            }
        }
        Err(e) => {
            tracing::error!("Device directory watch error: {}", e);
        }
    })?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::PathWatchFailed {
            path: dir.to_path_buf(),
            source,
        })?;
    tracing::info!("Watching {:?} for device changes", dir);

    Ok((
        DeviceWatcher {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        },
        rx,
    ))
}

#[cfg(test)]
impl Notification {
    pub fn created(name: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Created,
            name: name.into(),
        }
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Deleted,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::time::Duration;

    #[test]
    fn test_from_event_maps_create_and_remove() {
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/dev/input/event7"));
        assert_eq!(
            Notification::from_event(&create),
            vec![Notification::created("event7")]
        );

        let remove = Event::new(EventKind::Remove(RemoveKind::Any))
            .add_path(PathBuf::from("/dev/input/event7"));
        assert_eq!(
            Notification::from_event(&remove),
            vec![Notification::deleted("event7")]
        );
    }

    #[test]
    fn test_from_event_ignores_modifications() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/dev/input/event7"));
        assert!(Notification::from_event(&modify).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watcher_reports_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, mut rx) = watch_directory(dir.path()).unwrap();

        std::fs::write(dir.path().join("event42"), b"").unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(n) if n.kind == NotificationKind::Created => return Some(n),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("no notification within timeout")
        .expect("notification stream closed");

        assert_eq!(notification.name, "event42");
    }
}
