use std::net::IpAddr;
use std::str::FromStr;

use tracing::warn;

const DASHBOARD_PORT: &str = "DASHBOARD_PORT";

const DASHBOARD_ADDR: &str = "DASHBOARD_ADDR";

const DASHBOARD_UPDATE_INTERVAL_MS: &str = "DASHBOARD_UPDATE_INTERVAL_MS";

const DASHBOARD_HISTORY_SIZE: &str = "DASHBOARD_HISTORY_SIZE";

fn env_override<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {key}={raw}: not a valid value");
            None
        }
    }
}

pub fn get_port() -> Option<u16> {
    env_override(DASHBOARD_PORT)
}

pub fn get_addr() -> Option<IpAddr> {
    env_override(DASHBOARD_ADDR)
}

pub fn get_update_interval_ms() -> Option<u64> {
    env_override(DASHBOARD_UPDATE_INTERVAL_MS)
}

pub fn get_history_size() -> Option<usize> {
    env_override(DASHBOARD_HISTORY_SIZE)
}
