//! Error replies sent back to the offending sender.

use serde::Serialize;
use std::fmt;

/// Reasons a message is rejected by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReply {
    /// Another connection already holds this identity.
    UuidInUse,
    /// Another connection already holds this stream ID.
    SidInUse,
    /// The connection tried to claim a second, different stream ID.
    SidChange,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl ErrorReply {
    /// The reason string carried in the `error` field.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            ErrorReply::UuidInUse => "uuid already in use",
            ErrorReply::SidInUse => "sid already in use",
            ErrorReply::SidChange => "can't change sid",
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ErrorReply::UuidInUse => "uuid_in_use",
            ErrorReply::SidInUse => "sid_in_use",
            ErrorReply::SidChange => "sid_change",
        }
    }

    /// Render the reply as `{"error":"<reason>"}`.
    #[must_use]
    pub fn to_json(self) -> String {
        serde_json::to_string(&ErrorBody {
            error: self.reason(),
        })
        .unwrap_or_default()
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
