use std::fmt;

/// Machine-readable error codes shared by every chorus crate.
///
/// Per-module error enums map onto these so that logs and CLI output carry a
/// stable identifier regardless of which layer raised the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ChannelNotFound,
    DocumentNotFound,
    MalformedPayload,
    UnsupportedContentEncoding,
    HashMismatch,
    InvalidHash,
    DocumentTooLarge,
    HistoryIndexOutOfRange,
    CorruptStore,
    TransportBroken,
    DeliveryFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ChannelNotFound => "E2001",
            Self::DocumentNotFound => "E2002",
            Self::MalformedPayload => "E3001",
            Self::UnsupportedContentEncoding => "E3002",
            Self::HashMismatch => "E3003",
            Self::InvalidHash => "E3004",
            Self::DocumentTooLarge => "E4001",
            Self::HistoryIndexOutOfRange => "E4002",
            Self::CorruptStore => "E5001",
            Self::TransportBroken => "E6001",
            Self::DeliveryFailure => "E6002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ChannelNotFound => "Channel not found",
            Self::DocumentNotFound => "Document not found",
            Self::MalformedPayload => "Malformed commit payload",
            Self::UnsupportedContentEncoding => "Unsupported commit content encoding",
            Self::HashMismatch => "Commit hash mismatch",
            Self::InvalidHash => "Invalid commit hash",
            Self::DocumentTooLarge => "Document too large for attribution",
            Self::HistoryIndexOutOfRange => "History index out of range",
            Self::CorruptStore => "Corrupt local store",
            Self::TransportBroken => "Transport connection broken",
            Self::DeliveryFailure => "Subscriber delivery failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `chorus import` to create the local store."),
            Self::ConfigParseError => Some("Fix syntax in .chorus/config.toml and retry."),
            Self::ChannelNotFound => Some("List channels with `chorus messages` and retry."),
            Self::DocumentNotFound => None,
            Self::MalformedPayload | Self::UnsupportedContentEncoding => {
                Some("The commit is skipped; other commits in the batch still apply.")
            }
            Self::HashMismatch => Some("The commit was altered in transit and has been dropped."),
            Self::InvalidHash => Some("Commit hashes are 64 lowercase hex characters."),
            Self::DocumentTooLarge => Some("Raise [attribution] max_chars in .chorus/config.toml."),
            Self::HistoryIndexOutOfRange => Some("Pick an index listed by `chorus history`."),
            Self::CorruptStore => Some("Delete the store file and re-import the commit log."),
            Self::TransportBroken => Some("Reconnect once the replication service is reachable."),
            Self::DeliveryFailure => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
