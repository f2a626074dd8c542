/*!
 * Remote Failure Payload
 * Structured representation of an error raised inside a worker process
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured failure carried by an `error` message.
///
/// The payload is built once in the worker and delivered verbatim; the
/// parent never re-derives the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteFailure {
    /// Failure class name
    pub class: String,
    /// Human-readable message
    pub message: String,
    /// Ordered trace frames, paths relativized to the installation root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
}

impl RemoteFailure {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Capture an error raised by a callable.
    ///
    /// The cause chain provides the ordered frames; backtrace locations
    /// are appended when capture is enabled, with `base_path` stripped
    /// from source paths.
    pub fn from_error(err: &anyhow::Error, base_path: Option<&str>) -> Self {
        let mut frames: Vec<String> = err
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {}", cause))
            .collect();

        let backtrace = err.backtrace().to_string();
        frames.extend(
            backtrace
                .lines()
                .map(str::trim)
                .filter(|line| line.starts_with("at "))
                .map(|line| relativize(line, base_path)),
        );

        Self {
            class: classify(err),
            message: err.to_string(),
            frames,
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn classify(err: &anyhow::Error) -> String {
    if err.downcast_ref::<std::io::Error>().is_some() {
        "IoError".into()
    } else if err.downcast_ref::<serde_json::Error>().is_some() {
        "JsonError".into()
    } else if err.downcast_ref::<super::ProtocolError>().is_some() {
        "ProtocolError".into()
    } else {
        "Error".into()
    }
}

fn relativize(frame: &str, base_path: Option<&str>) -> String {
    match base_path {
        Some(base) if !base.is_empty() => {
            let prefix = format!("{}/", base.trim_end_matches('/'));
            frame.replace(&prefix, "")
        }
        _ => frame.to_string(),
    }
}
