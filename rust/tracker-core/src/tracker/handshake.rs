//! Sentinel-delimited handshake read from the tracker's standard output.
//!
//! The tracker announces the environment workers need as a block of
//! `KEY=VALUE` lines:
//!
//! ```text
//! DMLC_TRACKER_ENV_START
//! DMLC_TRACKER_URI=10.0.0.7
//! DMLC_TRACKER_PORT=9091
//! DMLC_TRACKER_ENV_END
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Result, TrackerError};

/// First line of the handshake block.
pub const ENV_START: &str = "DMLC_TRACKER_ENV_START";
/// Last line of the handshake block.
pub const ENV_END: &str = "DMLC_TRACKER_ENV_END";

/// Environment handed to workers so they can reach the tracker.
///
/// Keys are unique; re-inserting a key replaces its value but keeps the
/// position of the first insertion, so diagnostics list keys in the order
/// the tracker announced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    entries: Vec<(String, String)>,
}

impl WorkerEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

impl fmt::Display for WorkerEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WorkerEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}

/// Split a handshake line into `(key, value)`.
///
/// Trailing `=` characters are dropped first; what remains must hold exactly
/// one `=` with a non-empty value. The key may be empty (`=v`).
pub fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim_end_matches('=').split_once('=')?;
    if value.contains('=') {
        return None;
    }
    Some((key, value))
}

/// Read the handshake block from `reader`.
///
/// Leading blank lines are skipped, after which the first line must be
/// [`ENV_START`]. Reading stops right after [`ENV_END`], leaving any later
/// output unread in `reader`. Lines inside the block that are not
/// `KEY=VALUE` are ignored, and bytes that are not valid UTF-8 are replaced
/// rather than rejected.
///
/// # Errors
///
/// Returns a protocol error if the start sentinel is missing or the stream
/// ends before the end sentinel, and an I/O error if reading fails.
pub async fn read_worker_env<R>(reader: &mut R) -> Result<WorkerEnv>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        match next_line(reader, &mut line).await? {
            None => {
                return Err(TrackerError::protocol(format!(
                    "stream ended before {ENV_START}"
                )))
            }
            Some(l) if l.trim().is_empty() => continue,
            Some(l) if l.trim() == ENV_START => break,
            Some(l) => {
                return Err(TrackerError::protocol(format!(
                    "expected {ENV_START}, got '{}'",
                    l.trim()
                )))
            }
        }
    }

    let mut env = WorkerEnv::new();
    loop {
        let Some(l) = next_line(reader, &mut line).await? else {
            return Err(TrackerError::protocol(format!(
                "stream ended before {ENV_END} ({} entries read)",
                env.len()
            )));
        };
        if l.trim() == ENV_END {
            return Ok(env);
        }
        match parse_env_line(&l) {
            Some((key, value)) => {
                if let Some(previous) = env.insert(key, value) {
                    tracing::debug!(key, previous = %previous, value, "tracker repeated env key");
                }
            }
            None => tracing::trace!(line = %l, "ignoring non key=value handshake line"),
        }
    }
}

async fn next_line<'a, R>(reader: &mut R, buf: &'a mut Vec<u8>) -> Result<Option<Cow<'a, str>>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader
        .read_until(b'\n', buf)
        .await
        .map_err(|e| TrackerError::io("handshake", e))?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf)))
}
