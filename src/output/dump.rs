//! Device listing lines and capability dumps.

use crate::input::device::DeviceInfo;
use evdev::{AbsoluteAxisType, Device, EventType};
use std::fmt::Write;

/// Vendor/product pair as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

impl DeviceId {
    pub fn of(device: &Device) -> Self {
        let id = device.input_id();
        Self {
            vendor: id.vendor(),
            product: id.product(),
        }
    }
}

pub fn listing_line(info: &DeviceInfo, id: DeviceId) -> String {
    format!(
        "{:<20} [v{:04X} p{:04X}]:\t{}",
        info.path.display(),
        id.vendor,
        id.product,
        info.name
    )
}

/// Capabilities of `device`, one item per line, each line starting with
/// `prefix`.
pub fn dump_device(device: &Device, prefix: &str) -> String {
    let mut out = String::new();

    let mut types: Vec<EventType> = device.supported_events().iter().collect();
    types.sort_by_key(|t| t.0);

    for ty in types {
        let _ = writeln!(out, "{prefix}Event type {} ({:?})", ty.0, ty);

        if ty == EventType::KEY {
            match device.get_key_state() {
                Ok(keys) => {
                    for key in keys.iter() {
                        let _ = writeln!(out, "{prefix}  Event code {} ({:?}) state 1", key.code(), key);
                    }
                }
                Err(e) => tracing::debug!("Cannot read key state: {}", e),
            }
        }

        if ty != EventType::ABSOLUTE {
            continue;
        }
        let Some(axes) = device.supported_absolute_axes() else {
            continue;
        };
        let infos = match device.get_abs_state() {
            Ok(infos) => infos,
            Err(e) => {
                tracing::debug!("Cannot read absolute axis state: {}", e);
                continue;
            }
        };
        let mut axes: Vec<AbsoluteAxisType> = axes.iter().collect();
        axes.sort_by_key(|a| a.0);
        for axis in axes {
            let Some(info) = infos.get(axis.0 as usize) else {
                continue;
            };
            let _ = writeln!(out, "{prefix}  Event code {} ({:?})", axis.0, axis);
            let _ = writeln!(out, "{prefix}    Value: {}", info.value);
            let _ = writeln!(out, "{prefix}    Min: {}", info.minimum);
            let _ = writeln!(out, "{prefix}    Max: {}", info.maximum);
            for (label, value) in [
                ("Fuzz", info.fuzz),
                ("Flat", info.flat),
                ("Resolution", info.resolution),
            ] {
                if value != 0 {
                    let _ = writeln!(out, "{prefix}    {label}: {value}");
                }
            }
        }
    }

    let props: Vec<_> = device.properties().iter().collect();
    if !props.is_empty() {
        let _ = writeln!(out, "{prefix}Properties:");
        for prop in props {
            let _ = writeln!(out, "{prefix}  Property type {} ({:?})", prop.0, prop);
        }
    }

    out
}
