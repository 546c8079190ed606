//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::game::RoomCodePolicy;
use crate::udp::endpoint::DEFAULT_TRANSFORM_CAPACITY;
use crate::ws::outbound::DEFAULT_RELIABLE_CAPACITY;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:9536";
const DEFAULT_UDP_ADDR: &str = "0.0.0.0:9535";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Reliable channel (HTTP + WebSocket) binding address
    pub server_addr: SocketAddr,
    /// Transform channel binding address
    pub udp_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Fallback display names, one per line
    pub names_file: PathBuf,
    /// Frames queued per connection before the peer is disconnected
    pub reliable_queue_capacity: usize,
    /// Snapshots queued per player before the oldest is dropped
    pub transform_queue_capacity: usize,
    pub room_codes: RoomCodePolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a
    /// variable if it is set
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR or the default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        };
        let udp_addr = match lookup("UDP_PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => lookup("UDP_ADDR").unwrap_or_else(|| DEFAULT_UDP_ADDR.to_string()),
        };

        let room_codes = match lookup("DEBUG_ROOM_CODE") {
            Some(code) => RoomCodePolicy::Fixed(parse_room_code(&code)?),
            None => RoomCodePolicy::Random,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("SERVER_ADDR"))?,
            udp_addr: udp_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("UDP_ADDR"))?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            names_file: lookup("NAMES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("names.txt")),

            reliable_queue_capacity: capacity(
                &lookup,
                "RELIABLE_QUEUE_CAPACITY",
                DEFAULT_RELIABLE_CAPACITY,
            )?,
            transform_queue_capacity: capacity(
                &lookup,
                "TRANSFORM_QUEUE_CAPACITY",
                DEFAULT_TRANSFORM_CAPACITY,
            )?,
            room_codes,
        })
    }
}

fn capacity(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidNumber(key)),
    }
}

fn parse_room_code(raw: &str) -> Result<String, ConfigError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::InvalidRoomCode);
    }
    Ok(code)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid address format in {0}")]
    InvalidAddress(&'static str),

    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),

    #[error("DEBUG_ROOM_CODE must consist of letters only")]
    InvalidRoomCode,
}
