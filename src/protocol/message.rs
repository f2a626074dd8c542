/*!
 * Control Messages
 * The closed set of message kinds exchanged over a worker's duplex channel
 */

use super::failure::RemoteFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on the parent/child channel.
///
/// A well-formed sequence per request is
/// `Request -> (Send | SendRecv -> Answer)* -> (Response | Error)`,
/// with `Reload` allowed to interleave at any point (it never produces a
/// reply). The wire form is a tagged JSON object; an unknown `kind`
/// fails deserialization and surfaces as a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Parent -> child: execute a callable with the given arguments.
    Request {
        callable: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        keepalive: bool,
    },
    /// Child -> parent: terminal success.
    Response { value: Value },
    /// Either direction: terminal failure, or the parent aborting a
    /// child blocked in `sendrecv`.
    Error { error: RemoteFailure },
    /// Child -> parent: one-way pass-through, request stays open.
    Send { value: Value },
    /// Child -> parent: pass-through that suspends the child until an
    /// `Answer` (or `Error`) arrives.
    #[serde(rename = "sendrecv")]
    SendRecv { value: Value },
    /// Parent -> child: unblocks a pending `SendRecv`.
    Answer { value: Value },
    /// Parent -> child: hot-reload notification for one unit of code.
    Reload { module: String },
}

impl Message {
    /// Wire discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Response { .. } => "response",
            Message::Error { .. } => "error",
            Message::Send { .. } => "send",
            Message::SendRecv { .. } => "sendrecv",
            Message::Answer { .. } => "answer",
            Message::Reload { .. } => "reload",
        }
    }

    /// True for the two kinds that terminate a request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Response { .. } | Message::Error { .. })
    }

    /// True for mid-request child -> parent messages.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Message::Send { .. } | Message::SendRecv { .. })
    }
}
