use crate::HostStatus;
use crate::NodeRecord;
use crate::GIB;

const SIZE_UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Nearest power of two, so close measurements share a token
pub fn scale_number(value: f64) -> f64 {
    if !(value > 0.0) {
        return 0.0;
    }
    value.log2().round().exp2()
}

pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", SIZE_UNITS[unit])
}

/// Power-of-two size bucket, never below 1 GiB
pub fn scale_size(bytes: u64) -> String {
    let scaled = (scale_number(bytes as f64) as u64).max(GIB);
    human_size(scaled)
}

/// Feature tokens of a host: ip prefixes, platform, memory, latency and
/// storage buckets. `root` is the record representing the host.
pub fn host_tokens(
    root: &NodeRecord,
    host: &HostStatus,
) -> Vec<String> {
    let mut tokens = Vec::new();

    let octets: Vec<&str> = root.ip.split('.').collect();
    if let [a, b, c, d] = octets[..] {
        tokens.push(format!("ip:{a}.x.x.x"));
        tokens.push(format!("ip:{a}.{b}.x.x"));
        tokens.push(format!("ip:{a}.{b}.{c}.x"));
        tokens.push(format!("ip:{a}.{b}.{c}.{d}"));
    }

    if let Some(os) = &root.os_info {
        tokens.push(format!("platform:{}", os.platform));
        tokens.push(format!("arch:{}", os.arch));
        tokens.push(format!("totalmem:{}", scale_size(os.total_mem)));
    }

    for (name, value) in [
        ("avg_ping", host.avg_ping),
        ("avg_disk_read", host.avg_disk_read),
        ("avg_disk_write", host.avg_disk_write),
    ] {
        if let Some(value) = value {
            tokens.push(format!("{name}:{}", scale_number(value)));
        }
    }

    let storage = &host.storage;
    if storage.total > 0 {
        tokens.push(format!("storage_other:{}", scale_size(storage.used_other)));
        tokens.push(format!("storage_total:{}", scale_size(storage.total)));
    }
    tokens
}
