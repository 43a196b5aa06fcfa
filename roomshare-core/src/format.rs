use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= KIB && unit < SIZE_UNITS.len() - 1 {
        value /= KIB;
        unit += 1;
    }
    format!("{value:.1} {}", SIZE_UNITS[unit])
}

pub fn format_speed(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B/s".to_owned();
    }
    if bytes_per_second < KIB {
        format!("{bytes_per_second:.0} B/s")
    } else if bytes_per_second < MIB {
        format!("{:.1} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.1} MB/s", bytes_per_second / MIB)
    }
}

pub fn format_eta(eta: Duration) -> String {
    format!("{:.1}s", eta.as_secs_f64())
}

pub fn format_timestamp(epoch_seconds: f64) -> String {
    local_datetime(epoch_seconds)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown time".to_owned())
}

pub fn format_clock(epoch_seconds: f64) -> String {
    local_datetime(epoch_seconds)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_owned())
}

fn local_datetime(epoch_seconds: f64) -> Option<DateTime<Local>> {
    if !epoch_seconds.is_finite() {
        return None;
    }
    let secs = epoch_seconds.floor();
    let nanos = ((epoch_seconds - secs) * 1e9) as u32;
    Local.timestamp_opt(secs as i64, nanos).single()
}
