use evdev::Device;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Permission denied opening {path:?}: {source}")]
    PermissionDenied { path: PathBuf, source: io::Error },
    #[error("Device not found {path:?}: {source}")]
    NotFound { path: PathBuf, source: io::Error },
    #[error("Failed to open device {path:?}: {source}")]
    Other { path: PathBuf, source: io::Error },
}

impl OpenError {
    /// Sorts an io error from `open(2)` into the retry taxonomy.
    pub fn classify(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => OpenError::PermissionDenied { path, source },
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                OpenError::NotFound { path, source }
            }
            _ => match source.kind() {
                io::ErrorKind::PermissionDenied => OpenError::PermissionDenied { path, source },
                io::ErrorKind::NotFound => OpenError::NotFound { path, source },
                _ => OpenError::Other { path, source },
            },
        }
    }

    pub fn is_permission_race(&self) -> bool {
        matches!(self, OpenError::PermissionDenied { .. })
    }
}

/// Identity of an input device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}

pub trait DeviceHandle {
    fn info(&self) -> &DeviceInfo;
}

/// Opens device nodes by path.
pub trait DeviceRegistry {
    type Handle: DeviceHandle;

    fn open(&self, path: &Path) -> Result<Self::Handle, OpenError>;
}

/// An opened evdev device together with the identity it was opened under.
pub struct EvdevDevice {
    info: DeviceInfo,
    device: Device,
}

impl EvdevDevice {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn into_parts(self) -> (DeviceInfo, Device) {
        (self.info, self.device)
    }
}

impl DeviceHandle for EvdevDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

/// Registry over a kernel device directory such as `/dev/input`.
#[derive(Debug, Clone)]
pub struct EvdevRegistry {
    dir: PathBuf,
}

impl EvdevRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Event device nodes in the directory, in natural path order.
    pub fn list_paths(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if is_event_node(name) {
                    paths.push(entry.path());
                }
            }
        }
        sort_naturally(&mut paths);
        tracing::debug!("Found {} event nodes in {:?}", paths.len(), self.dir);
        Ok(paths)
    }
}

impl DeviceRegistry for EvdevRegistry {
    type Handle = EvdevDevice;

    fn open(&self, path: &Path) -> Result<EvdevDevice, OpenError> {
        let device = Device::open(path).map_err(|e| OpenError::classify(path, e))?;
        let name = device.name().unwrap_or("").to_string();
        tracing::debug!("Opened {:?} (name: {:?})", path, name);
        Ok(EvdevDevice {
            info: DeviceInfo::new(path, name),
            device,
        })
    }
}

/// Kernel naming convention for evdev nodes: `event` followed by digits.
pub fn is_event_node(name: &str) -> bool {
    name.strip_prefix("event")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Orders paths the way a person would, so that `event2` sorts before
/// `event10`.
pub fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
}
