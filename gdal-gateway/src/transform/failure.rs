//! Typed failure reported by every transform capability.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TransformKind;

/// Longest engine diagnostic kept in a failure message.
const MAX_DIAGNOSTIC_CHARS: usize = 600;

/// Why a transform did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "code")]
pub enum FailureReason {
    /// Engine ran and exited non-zero.
    EngineFailed(i32),
    /// Engine binary missing or could not be started.
    EngineUnavailable,
    /// Engine exceeded its time budget and was killed.
    Timeout,
    /// Parameters or input rejected before any engine was invoked.
    InvalidInput,
    /// Remote service never produced a usable response (connect, timeout, broken transfer).
    Network,
    /// Remote service answered with a non-2xx status.
    RemoteStatus(u16),
    /// Remote service answered 2xx but with an exception document or no image.
    RemoteException,
    /// Writing the produced artifact failed.
    Storage,
}

/// A transform capability failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failed: {message}")]
pub struct TransformFailure {
    pub kind: TransformKind,
    pub reason: FailureReason,
    pub message: String,
}

impl TransformFailure {
    pub fn new(kind: TransformKind, reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason,
            message: message.into(),
        }
    }

    pub fn invalid_input(kind: TransformKind, message: impl Into<String>) -> Self {
        Self::new(kind, FailureReason::InvalidInput, message)
    }

    pub fn network(kind: TransformKind, message: impl Into<String>) -> Self {
        Self::new(kind, FailureReason::Network, message)
    }

    pub fn storage(kind: TransformKind, err: impl std::fmt::Display) -> Self {
        Self::new(kind, FailureReason::Storage, format!("storing output: {err}"))
    }

    /// Engine exited with `code`; `stderr` is trimmed into the message.
    pub fn engine_failed(kind: TransformKind, code: i32, stderr: &str) -> Self {
        let diagnostic = tail_chars(stderr.trim(), MAX_DIAGNOSTIC_CHARS);
        let message = if diagnostic.is_empty() {
            format!("engine exited with code {code}")
        } else {
            format!("engine exited with code {code}: {diagnostic}")
        };
        Self::new(kind, FailureReason::EngineFailed(code), message)
    }

    /// The remote side never answered usefully (as opposed to answering with an error).
    pub fn is_connection_failure(&self) -> bool {
        matches!(self.reason, FailureReason::Network)
    }
}

/// Last `max` characters of `s`, on a char boundary.
fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
