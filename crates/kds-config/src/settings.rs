//! Typed view over the merged config JSON.
//!
//! Every key has a default except `/upstream/base_url`. Unknown keys are
//! ignored here; the layered loader already refused secret literals.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_BASE_DELAY_MS: u64 = 350;
pub const DEFAULT_PAGE_SIZE: u32 = 24;
pub const DEFAULT_NOTES_CAPACITY: usize = 512;
pub const DEFAULT_NOTES_TTL_SECS: u64 = 900;

/// Status sent upstream when a completed order is undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoTarget {
    New,
    Inproc,
}

impl UndoTarget {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(UndoTarget::New),
            "INPROC" => Ok(UndoTarget::Inproc),
            other => bail!(
                "invalid /runtime/undo_target '{}'. expected one of: NEW | INPROC",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    pub retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    /// Business codes that are worth retrying. Empty = any code other than `"1"`.
    pub retryable_codes: Vec<String>,
    pub page_size: u32,
    pub strict_verification: bool,
    pub undo_target: UndoTarget,
    pub notes_capacity: usize,
    pub notes_ttl: Duration,
}

impl SyncConfig {
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let base_url = v
            .pointer("/upstream/base_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("CONFIG_MISSING: /upstream/base_url is required"))?
            .trim_end_matches('/')
            .to_string();

        let retryable_codes = match v.pointer("/client/retryable_codes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(scalar_to_string).collect(),
            Some(other) => bail!(
                "invalid /client/retryable_codes: expected a list, got {}",
                other
            ),
        };

        let undo_target = match v.pointer("/runtime/undo_target").and_then(Value::as_str) {
            Some(s) => UndoTarget::parse(s)?,
            None => UndoTarget::New,
        };

        let page_size = read_u32(v, "/reader/page_size", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            bail!("invalid /reader/page_size: must be >= 1");
        }

        Ok(Self {
            base_url,
            retries: read_u32(v, "/client/retries", DEFAULT_RETRIES)?,
            timeout: Duration::from_millis(read_u64(v, "/client/timeout_ms", DEFAULT_TIMEOUT_MS)?),
            base_delay: Duration::from_millis(read_u64(
                v,
                "/client/base_delay_ms",
                DEFAULT_BASE_DELAY_MS,
            )?),
            retryable_codes,
            page_size,
            strict_verification: v
                .pointer("/runtime/strict_verification")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            undo_target,
            notes_capacity: read_usize(v, "/notes_cache/capacity", DEFAULT_NOTES_CAPACITY)?,
            notes_ttl: Duration::from_secs(read_u64(
                v,
                "/notes_cache/ttl_secs",
                DEFAULT_NOTES_TTL_SECS,
            )?),
        })
    }
}

fn read_u64(v: &Value, pointer: &str, default: u64) -> Result<u64> {
    match v.pointer(pointer) {
        None | Some(Value::Null) => Ok(default),
        Some(x) => x
            .as_u64()
            .ok_or_else(|| anyhow!("invalid {}: expected a non-negative integer, got {}", pointer, x)),
    }
}

fn read_u32(v: &Value, pointer: &str, default: u32) -> Result<u32> {
    let n = read_u64(v, pointer, u64::from(default))?;
    u32::try_from(n).with_context(|| format!("invalid {pointer}: {n} is out of range"))
}

fn read_usize(v: &Value, pointer: &str, default: usize) -> Result<usize> {
    let fallback = u64::try_from(default).unwrap_or(u64::MAX);
    let n = read_u64(v, pointer, fallback)?;
    usize::try_from(n).with_context(|| format!("invalid {pointer}: {n} is out of range"))
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
