//! Database row types. These map directly to SQLite rows and are kept apart
//! from the tally-types API models so the DB layer stays independent.
use chrono::{DateTime, Utc};
use tally_types::models::{FeedCursor, VoteDirection};
use tracing::warn;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A post joined with its creator's username.
#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub points: i64,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostRow {
    /// Feed position just past this post.
    pub fn cursor(&self) -> FeedCursor {
        FeedCursor::new(self.created_at, self.id)
    }
}

/// A post as seen by one viewer.
#[derive(Debug, Clone)]
pub struct FeedPost {
    pub post: PostRow,
    pub vote_status: Option<VoteDirection>,
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub has_more: bool,
}

impl FeedPage {
    pub fn next_cursor(&self) -> Option<FeedCursor> {
        self.posts.last().map(|p| p.post.cursor())
    }
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
        warn!("Timestamp out of range: {}", millis);
        DateTime::default()
    })
}
