/// Transfer configuration with defaults and environment overrides.

use std::time::Duration;

use crate::channel::WireMode;
use crate::error::TransferError;
use crate::protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_RETRANSMIT_MS, DEFAULT_WINDOW_SIZE};

/// Tunables for one session's transfers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Payload bytes per chunk (all but the last chunk).
    pub chunk_size: u32,
    /// Unacknowledged chunks allowed in flight per transfer.
    pub window_size: u32,
    /// Fixed per-chunk retransmit timeout. No backoff.
    pub retransmit_timeout: Duration,
    /// Retransmits allowed per chunk before the transfer fails.
    /// `None` retries forever.
    pub max_retransmits: Option<u32>,
    /// Chunk framing used on this session's channel.
    pub wire_mode: WireMode,
    /// Whether zero-byte files may be sent.
    pub allow_empty_files: bool,
    /// Send a SHA-256 digest with the metadata and check it on arrival.
    pub verify_integrity: bool,
    /// Largest file the receiver will buffer.
    pub max_file_size: u64,
    /// Most chunks the receiver will track for one file. Bounds the slot
    /// table a peer can make us allocate with a tiny chunk size.
    pub max_chunks: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            retransmit_timeout: Duration::from_millis(DEFAULT_RETRANSMIT_MS),
            max_retransmits: None,
            wire_mode: WireMode::Packed,
            allow_empty_files: true,
            verify_integrity: true,
            max_file_size: 4 * 1024 * 1024 * 1024, // 4 GiB
            max_chunks: 1 << 18,                   // 4 GiB of default chunks
        }
    }
}

impl TransferConfig {
    /// Defaults overridden by `PEERDROP_*` environment variables.
    pub fn from_env() -> Result<Self, TransferError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `PEERDROP_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransferError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse(&lookup, "PEERDROP_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse(&lookup, "PEERDROP_WINDOW_SIZE")? {
            config.window_size = v;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "PEERDROP_RETRANSMIT_MS")? {
            config.retransmit_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("PEERDROP_MAX_RETRANSMITS") {
            config.max_retransmits = match raw.trim() {
                "" | "unbounded" => None,
                n => Some(n.parse().map_err(|e| {
                    TransferError::Config(format!("PEERDROP_MAX_RETRANSMITS={}: {}", n, e))
                })?),
            };
        }
        if let Some(v) = parse(&lookup, "PEERDROP_WIRE_MODE")? {
            config.wire_mode = v;
        }
        if let Some(v) = parse(&lookup, "PEERDROP_ALLOW_EMPTY")? {
            config.allow_empty_files = v;
        }
        if let Some(v) = parse(&lookup, "PEERDROP_VERIFY")? {
            config.verify_integrity = v;
        }
        if let Some(v) = parse(&lookup, "PEERDROP_MAX_FILE_SIZE")? {
            config.max_file_size = v;
        }
        if let Some(v) = parse(&lookup, "PEERDROP_MAX_CHUNKS")? {
            config.max_chunks = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engines cannot work with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::Config("chunk_size must be positive".into()));
        }
        if self.window_size == 0 {
            return Err(TransferError::Config("window_size must be positive".into()));
        }
        if self.retransmit_timeout.is_zero() {
            return Err(TransferError::Config("retransmit_timeout must be positive".into()));
        }
        if self.max_chunks == 0 {
            return Err(TransferError::Config("max_chunks must be positive".into()));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, TransferError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| TransferError::Config(format!("{}={}: {}", key, raw, e))),
    }
}
