//! Typed process configuration, loaded from the environment with defaults.
//!
//! Mirrors the corpus's manual-env pattern rather than pulling in a config
//! file parser: a server binary in this stack reads `std::env::var` with a
//! fallback, the same way the teacher's CLI-less services do.

use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: String,
    pub port: u16,
    pub ws_path: String,
    pub db_path: String,
    pub max_networks: usize,
    pub max_members_per_network: usize,
    pub pin_pattern: String,
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
    pub read_buffer_bytes: usize,
    pub write_buffer_frames: usize,
    pub subnet_base: [u8; 2],
    pub network_expiry_days: i64,
    pub cleanup_interval: Duration,
    pub drain_timeout: Duration,
    pub log_level: String,
    /// `None` means allow any origin; `Some` is a comma-separated allowlist.
    pub allowed_origins: Option<String>,
}

impl HubConfig {
    pub fn from_env() -> Self {
        HubConfig {
            bind_addr: env_or("HUB_BIND_ADDR", "0.0.0.0"),
            port: env_or("HUB_PORT", "8080").parse().unwrap_or(8080),
            ws_path: env_or("HUB_PATH", "/ws"),
            db_path: env_or("HUB_DB_PATH", "hub.db"),
            max_networks: env_or("HUB_MAX_NETWORKS", "10000").parse().unwrap_or(10_000),
            max_members_per_network: env_or("HUB_MAX_MEMBERS_PER_NETWORK", "254")
                .parse()
                .unwrap_or(254),
            pin_pattern: env_or("HUB_PIN_PATTERN", r"^\d{4}$"),
            idle_timeout: Duration::from_secs(
                env_or("HUB_IDLE_TIMEOUT_SECONDS", "60").parse().unwrap_or(60),
            ),
            ping_interval: Duration::from_secs(
                env_or("HUB_PING_INTERVAL_SECONDS", "20").parse().unwrap_or(20),
            ),
            read_buffer_bytes: env_or("HUB_READ_BUFFER_BYTES", "65536")
                .parse()
                .unwrap_or(65_536),
            write_buffer_frames: env_or("HUB_WRITE_BUFFER_FRAMES", "256")
                .parse()
                .unwrap_or(256),
            subnet_base: parse_subnet_base(&env_or("HUB_SUBNET_BASE", "10.10")),
            network_expiry_days: env_or("HUB_NETWORK_EXPIRY_DAYS", "30")
                .parse()
                .unwrap_or(30),
            cleanup_interval: Duration::from_secs(
                env_or("HUB_CLEANUP_INTERVAL_HOURS", "1")
                    .parse::<u64>()
                    .unwrap_or(1)
                    * 3600,
            ),
            drain_timeout: Duration::from_secs(
                env_or("HUB_DRAIN_TIMEOUT_SECONDS", "30").parse().unwrap_or(30),
            ),
            log_level: env_or("HUB_LOG_LEVEL", "info"),
            allowed_origins: std::env::var("HUB_ALLOWED_ORIGINS").ok(),
        }
    }

    /// Render the `/24` subnet for the given network index, e.g. `10.10.3.0/24`.
    pub fn subnet_for(&self, network_index: u16) -> String {
        let [a, b] = self.subnet_base;
        let third = (network_index % 256) as u8;
        format!("{a}.{b}.{third}.0/24")
    }

    /// Gateway-reserved host octet range for a `/24`: 1..=254.
    pub fn host_octet_range() -> std::ops::RangeInclusive<u8> {
        1..=254
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_subnet_base(s: &str) -> [u8; 2] {
    let mut parts = s.split('.');
    let a: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(10);
    let b: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(10);
    [a, b]
}

/// Parse a third-octet + host-octet subnet string (`"10.10.3.0/24"`) back into
/// its gateway address, used by the allocator to compute full IPs.
pub fn subnet_network_octet(subnet: &str) -> Option<u8> {
    let addr_part = subnet.split('/').next()?;
    let mut octets = addr_part.split('.');
    octets.next()?;
    octets.next()?;
    octets.next()?.parse().ok()
}

pub fn host_ip(subnet: &str, host_octet: u8) -> Option<Ipv4Addr> {
    let addr_part = subnet.split('/').next()?;
    let mut octets = addr_part.split('.');
    let a: u8 = octets.next()?.parse().ok()?;
    let b: u8 = octets.next()?.parse().ok()?;
    let c: u8 = octets.next()?.parse().ok()?;
    Some(Ipv4Addr::new(a, b, c, host_octet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_for_formats_third_octet() {
        let cfg = HubConfig {
            subnet_base: [10, 10],
            ..HubConfig::from_env()
        };
        assert_eq!(cfg.subnet_for(3), "10.10.3.0/24");
    }

    #[test]
    fn host_ip_combines_subnet_and_octet() {
        let ip = host_ip("10.10.3.0/24", 42).unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 10, 3, 42));
    }
}
