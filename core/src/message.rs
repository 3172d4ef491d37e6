//! Message summaries and their content-derived identity

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, UtcOffset};

/// Message flags the sync core projects from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFlag {
    /// Message is seen/read
    Seen,
    /// Message is flagged
    Flagged,
}

impl std::fmt::Display for MessageFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageFlag::Seen => write!(f, "Seen"),
            MessageFlag::Flagged => write!(f, "Flagged"),
        }
    }
}

/// Header-level data for one message, as returned by a peek fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessageHeader {
    /// Server-assigned sequence number (1-based, shifts on expunge)
    pub sequence: u32,
    /// Sender address
    pub from_address: String,
    /// Sender display name
    pub from_display_name: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Sent date
    pub sent_at: OffsetDateTime,
    /// Message carries at least one attachment
    pub has_attachment: bool,
    /// \Seen flag
    pub seen: bool,
    /// \Flagged flag
    pub flagged: bool,
}

impl RawMessageHeader {
    /// Create an unflagged header without attachments
    pub fn new(
        from_address: impl Into<String>,
        from_display_name: Option<String>,
        subject: Option<String>,
        sent_at: OffsetDateTime,
    ) -> Self {
        Self {
            sequence: 0,
            from_address: from_address.into(),
            from_display_name,
            subject,
            sent_at,
            has_attachment: false,
            seen: false,
            flagged: false,
        }
    }

    /// Identity of the message this header describes
    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity::compute(
            &self.from_address,
            self.from_display_name.as_deref().unwrap_or_default(),
            self.subject.as_deref().unwrap_or_default(),
            self.sent_at,
        )
    }
}

/// Stable identity of a logical message
///
/// SHA-256 over sender address, sender name, subject and the ISO-8601 form of
/// the sent instant in UTC. Survives sequence renumbering; two distinct messages sharing
/// all four values collapse into one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageIdentity([u8; 32]);

impl MessageIdentity {
    /// Derive the identity from header fields
    pub fn compute(
        from_address: &str,
        from_display_name: &str,
        subject: &str,
        sent_at: OffsetDateTime,
    ) -> Self {
        let sent_at = sent_at.to_offset(UtcOffset::UTC);
        let sent = sent_at
            .format(&Iso8601::DEFAULT)
            .unwrap_or_else(|_| sent_at.unix_timestamp_nanos().to_string());

        let mut hasher = Sha256::new();
        hasher.update(from_address.as_bytes());
        hasher.update(from_display_name.as_bytes());
        hasher.update(subject.as_bytes());
        hasher.update(sent.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for MessageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageIdentity({})", &hex::encode(self.0)[..12])
    }
}

/// Addresses a message for remote mutations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Folder holding the message
    pub folder: String,
    /// Content identity of the message
    pub identity: MessageIdentity,
}

/// Immutable snapshot of a message's header metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    from_address: String,
    from_display_name: String,
    subject: String,
    sent_at: OffsetDateTime,
    has_attachment: bool,
    is_read: bool,
    is_flagged: bool,
    identity: MessageIdentity,
}

impl MessageSummary {
    /// Create a new summary, computing its identity
    pub fn new(
        from_address: impl Into<String>,
        from_display_name: impl Into<String>,
        subject: impl Into<String>,
        sent_at: OffsetDateTime,
    ) -> Self {
        let from_address = from_address.into();
        let from_display_name = from_display_name.into();
        let subject = subject.into();
        let identity = MessageIdentity::compute(&from_address, &from_display_name, &subject, sent_at);
        Self {
            from_address,
            from_display_name,
            subject,
            sent_at,
            has_attachment: false,
            is_read: false,
            is_flagged: false,
            identity,
        }
    }

    /// Project a fetched header into a summary
    pub fn from_header(header: &RawMessageHeader) -> Self {
        Self::new(
            header.from_address.clone(),
            header.from_display_name.clone().unwrap_or_default(),
            header.subject.clone().unwrap_or_default(),
            header.sent_at,
        )
        .with_attachment(header.has_attachment)
        .with_read(header.seen)
        .with_flagged(header.flagged)
    }

    pub fn with_attachment(mut self, has_attachment: bool) -> Self {
        self.has_attachment = has_attachment;
        self
    }

    pub fn with_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn with_flagged(mut self, is_flagged: bool) -> Self {
        self.is_flagged = is_flagged;
        self
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn from_display_name(&self) -> &str {
        &self.from_display_name
    }

    /// Subject, empty when the message has none
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sent_at(&self) -> OffsetDateTime {
        self.sent_at
    }

    pub fn has_attachment(&self) -> bool {
        self.has_attachment
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn is_flagged(&self) -> bool {
        self.is_flagged
    }

    pub fn identity(&self) -> MessageIdentity {
        self.identity
    }

    /// Reference for remote mutations of this message in `folder`
    pub fn message_ref(&self, folder: &str) -> MessageRef {
        MessageRef {
            folder: folder.to_string(),
            identity: self.identity,
        }
    }
}

/// Sort most recently sent first; equal dates keep their relative order
pub fn sort_by_recency(messages: &mut [MessageSummary]) {
    messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
}
