use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of characters of a post body shown in feed listings.
pub const SNIPPET_LEN: usize = 50;

/// First `SNIPPET_LEN` characters of a post body. Cuts on character count,
/// not on word boundaries, and never appends an ellipsis.
pub fn text_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LEN).collect()
}

// -- Votes --

/// Normalized vote signal. Serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stored vote value must be 1 or -1, got {0}")]
pub struct InvalidVoteValue(pub i64);

impl VoteDirection {
    /// Collapses any client-supplied value by sign. Negative values are a
    /// downvote, everything else (zero included) is an upvote.
    pub fn from_value(value: i64) -> Self {
        if value < 0 { Self::Down } else { Self::Up }
    }

    pub fn value(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteDirection {
    type Error = InvalidVoteValue;

    /// Strict conversion for persisted values.
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl Serialize for VoteDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.value())
    }
}

impl<'de> Deserialize<'de> for VoteDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_value)
    }
}

/// Score change caused by moving a viewer's vote from `previous` to `next`.
///
/// Shared by the server's vote engine and the client's cache updates so the
/// two always agree: a fresh vote moves the score by one, a flip by two, and
/// repeating the current vote does nothing.
pub fn vote_delta(previous: Option<VoteDirection>, next: VoteDirection) -> i64 {
    match previous {
        None => next.value(),
        Some(prev) if prev == next => 0,
        Some(_) => 2 * next.value(),
    }
}

// -- Feed cursor --

/// Position in the newest-first feed: the creation time (unix millis) and id
/// of the last post a client has seen. Pages after a cursor only contain
/// posts strictly older in `(created_at, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedCursor {
    pub created_at: i64,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("cursor is malformed")]
    Malformed,
}

impl FeedCursor {
    pub fn new(created_at: i64, id: i64) -> Self {
        Self { created_at, id }
    }

    /// Opaque token handed to clients.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.created_at, self.id))
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for FeedCursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = URL_SAFE_NO_PAD.decode(s)?;
        let raw = String::from_utf8(raw).map_err(|_| CursorError::Malformed)?;
        let (created_at, id) = raw.split_once(':').ok_or(CursorError::Malformed)?;

        Ok(Self {
            created_at: created_at.parse().map_err(|_| CursorError::Malformed)?,
            id: id.parse().map_err(|_| CursorError::Malformed)?,
        })
    }
}
