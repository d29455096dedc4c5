//! Per-device read loops and event printing.

use crate::input::device::{DeviceHandle, DeviceInfo, EvdevDevice};
use crate::output::color::{Palette, Role};
use crate::output::dump::DeviceId;
use evdev::{InputEvent, InputEventKind, Synchronization};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Error reading from device {path:?}: {source}")]
    Device { path: PathBuf, source: io::Error },
    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Which device printed last, and when.
#[derive(Debug, Default)]
pub struct BannerState {
    last_path: Option<PathBuf>,
    last_time: Option<Instant>,
}

impl BannerState {
    /// Records a print from `path` at `now` and returns whether the device
    /// banner has to precede it.
    pub fn record(&mut self, path: &Path, now: Instant, interval: Duration) -> bool {
        let stale = self
            .last_time
            .map_or(true, |last| now.saturating_duration_since(last) > interval);
        let other_device = self.last_path.as_deref() != Some(path);

        self.last_time = Some(now);
        if other_device {
            self.last_path = Some(path.to_path_buf());
        }
        stale || other_device
    }
}

pub struct Printer {
    palette: Palette,
    banner: Mutex<BannerState>,
    banner_interval: Duration,
    verbose: bool,
}

impl Printer {
    pub fn new(palette: Palette, banner_interval: Duration, verbose: bool) -> Self {
        Self {
            palette,
            banner: Mutex::new(BannerState::default()),
            banner_interval,
            verbose,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn banner(&self, info: &DeviceInfo, id: DeviceId) -> String {
        let p = &self.palette;
        format!(
            "{} {}",
            p.paint(Role::DeviceLine, "# From device"),
            [
                p.paint(Role::DeviceLine, "["),
                p.paint(Role::DeviceId, &format!("v{:04X} p{:04X}", id.vendor, id.product)),
                p.paint(Role::DeviceLine, "]: "),
                p.paint(Role::DeviceName, &info.name),
                p.paint(Role::DeviceLine, &format!(" ({})", info.path.display())),
            ]
            .concat()
        )
    }

    pub fn event_line(&self, timestamp: SystemTime, event: &InputEvent) -> String {
        let (role, text) = describe_event(event);
        format!(
            "[{}] {}",
            self.palette.paint(Role::Time, &format_timestamp(timestamp)),
            self.palette.paint(role, &text)
        )
    }

    /// Prints one event, preceded by the device banner when the output last
    /// came from elsewhere or has been quiet for a while.
    pub fn print_event(
        &self,
        info: &DeviceInfo,
        id: DeviceId,
        event: &InputEvent,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let line = self.event_line(event.timestamp(), event);

        let mut banner = self.banner.lock();
        if banner.record(&info.path, Instant::now(), self.banner_interval) {
            writeln!(out, "{}", self.banner(info, id))?;
        }
        writeln!(out, "{}", line)
    }
}

pub fn format_timestamp(timestamp: SystemTime) -> String {
    let since_epoch = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:06}", since_epoch.as_secs(), since_epoch.subsec_micros())
}

fn describe_event(event: &InputEvent) -> (Role, String) {
    let ty = event.event_type();
    let (role, code_name) = match event.kind() {
        InputEventKind::Synchronization(sync) => {
            let role = if sync == Synchronization::SYN_REPORT {
                Role::SynReport
            } else if sync == Synchronization::SYN_DROPPED {
                Role::Failure
            } else {
                Role::Other
            };
            return (role, format!("-------------- {:?} ------------", sync));
        }
        InputEventKind::Key(key) => (Role::Key, format!("{:?}", key)),
        InputEventKind::RelAxis(axis) => (Role::Rel, format!("{:?}", axis)),
        InputEventKind::AbsAxis(axis) => (Role::Abs, format!("{:?}", axis)),
        InputEventKind::Misc(misc) => (Role::Other, format!("{:?}", misc)),
        InputEventKind::Switch(switch) => (Role::Other, format!("{:?}", switch)),
        InputEventKind::Led(led) => (Role::Other, format!("{:?}", led)),
        InputEventKind::Sound(sound) => (Role::Other, format!("{:?}", sound)),
        _ => (Role::Other, "?".to_string()),
    };
    (
        role,
        format!(
            "type: 0x{:02x} [{:?}], code: 0x{:02x} ({}), value: {}",
            ty.0,
            ty,
            event.code(),
            code_name,
            event.value()
        ),
    )
}

/// Blocking read loop for one accepted device. Returns when the device
/// reports an error, usually because it was unplugged.
pub fn read_loop(printer: &Printer, handle: EvdevDevice) -> Result<(), ReadError> {
    let (info, mut device) = handle.into_parts();
    let id = DeviceId::of(&device);
    tracing::debug!("Reading events from {}", info);

    loop {
        if printer.verbose() {
            println!("Waiting for input ({})...", info.name);
        }
        match device.fetch_events() {
            Ok(events) => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                for event in events {
                    printer.print_event(&info, id, &event, &mut out)?;
                }
                out.flush()?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                return Err(ReadError::Device {
                    path: info.path.clone(),
                    source: e,
                });
            }
        }
    }
}

/// Moves the device onto a blocking thread and reads it until it fails.
pub fn spawn_reader(printer: Arc<Printer>, handle: EvdevDevice) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let path = handle.info().path.clone();
        if let Err(e) = read_loop(&printer, handle) {
            tracing::error!("{}", e);
        }
        tracing::debug!("Stopped reading {:?}", path);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::{EventType, Key};

    fn printer() -> Printer {
        Printer::new(Palette::new(false), Duration::from_secs(3), false)
    }

    #[test]
    fn test_banner_on_first_event_and_device_switch() {
        let mut state = BannerState::default();
        let t0 = Instant::now();
        let interval = Duration::from_secs(3);
        let a = Path::new("/dev/input/event1");
        let b = Path::new("/dev/input/event2");

        assert!(state.record(a, t0, interval));
        assert!(!state.record(a, t0 + Duration::from_millis(10), interval));
        assert!(state.record(b, t0 + Duration::from_millis(20), interval));
        assert!(state.record(a, t0 + Duration::from_millis(30), interval));
    }

    #[test]
    fn test_banner_after_quiet_interval() {
        let mut state = BannerState::default();
        let t0 = Instant::now();
        let interval = Duration::from_secs(3);
        let a = Path::new("/dev/input/event1");

        assert!(state.record(a, t0, interval));
        assert!(!state.record(a, t0 + Duration::from_secs(2), interval));
        assert!(!state.record(a, t0 + Duration::from_secs(4), interval));
        assert!(state.record(a, t0 + Duration::from_secs(8), interval));
    }

    #[test]
    fn test_timestamp_has_microsecond_padding() {
        let ts = UNIX_EPOCH + Duration::new(1_700_000_000, 42_000);
        assert_eq!(format_timestamp(ts), "1700000000.000042");
    }

    #[test]
    fn test_sync_report_line() {
        let event = InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0);
        let line = printer().event_line(UNIX_EPOCH + Duration::new(5, 0), &event);
        assert_eq!(line, "[5.000000] -------------- SYN_REPORT ------------");
    }

    #[test]
    fn test_key_event_line() {
        let event = InputEvent::new(EventType::KEY, Key::KEY_A.code(), 1);
        let line = printer().event_line(UNIX_EPOCH + Duration::new(1, 500), &event);
        assert!(line.starts_with("[1.000000] type: 0x01 "));
        assert!(line.contains("code: 0x1e (KEY_A)"));
        assert!(line.ends_with("value: 1"));
    }

    #[test]
    fn test_print_event_emits_banner_once_per_burst() {
        let printer = printer();
        let info = DeviceInfo::new("/dev/input/event4", "USB Keyboard");
        let id = DeviceId {
            vendor: 0x046d,
            product: 0xc31c,
        };
        let key = InputEvent::new(EventType::KEY, Key::KEY_B.code(), 0);
        let mut out = Vec::new();

        printer.print_event(&info, id, &key, &mut out).unwrap();
        printer.print_event(&info, id, &key, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let banners: Vec<_> = text.lines().filter(|l| l.starts_with("# From device")).collect();
        assert_eq!(
            banners,
            ["# From device [v046D pC31C]: USB Keyboard (/dev/input/event4)"]
        );
        assert_eq!(text.lines().count(), 3);
    }
}
