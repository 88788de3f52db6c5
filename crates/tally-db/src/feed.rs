use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params_from_iter};
use tally_types::models::{FeedCursor, VoteDirection};

use crate::Database;
use crate::models::{FeedPage, FeedPost, PostRow};
use crate::queries::{POST_COLUMNS, post_from_row};

/// Hard cap on posts per page, whatever the caller asks for.
pub const FEED_PAGE_MAX: i64 = 50;

pub fn clamp_limit(requested: i64) -> i64 {
    requested.clamp(1, FEED_PAGE_MAX)
}

impl Database {
    /// One page of the newest-first feed.
    ///
    /// Posts are ordered by `(created_at, id)` descending; with a cursor only
    /// posts strictly past it are returned, so posts created while a client
    /// pages through land ahead of the first page and never shift later ones.
    /// One extra row is fetched as an existence probe for `has_more` and then
    /// dropped.
    pub fn fetch_page(
        &self,
        limit: i64,
        cursor: Option<FeedCursor>,
        viewer: Option<i64>,
    ) -> Result<FeedPage> {
        let limit = clamp_limit(limit);

        self.with_conn(|conn| {
            let mut rows = query_feed(conn, limit + 1, cursor)?;
            let has_more = rows.len() as i64 > limit;
            rows.truncate(limit as usize);

            let mut statuses = match viewer {
                Some(viewer) => {
                    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
                    vote_statuses(conn, viewer, &ids)?
                }
                None => HashMap::new(),
            };

            let posts = rows
                .into_iter()
                .map(|post| FeedPost {
                    vote_status: statuses.remove(&post.id),
                    post,
                })
                .collect();

            Ok(FeedPage { posts, has_more })
        })
    }
}

fn query_feed(conn: &Connection, fetch: i64, cursor: Option<FeedCursor>) -> Result<Vec<PostRow>> {
    let rows = match cursor {
        Some(cursor) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON u.id = p.creator_id
                 WHERE (p.created_at, p.id) < (?1, ?2)
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?3"
            ))?;
            stmt.query_map(rusqlite::params![cursor.created_at, cursor.id, fetch], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON u.id = p.creator_id
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?1"
            ))?;
            stmt.query_map([fetch], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(rows)
}

/// Batch-fetch `viewer`'s votes on a set of posts in a single query.
pub(crate) fn vote_statuses(
    conn: &Connection,
    viewer: i64,
    post_ids: &[i64],
) -> Result<HashMap<i64, VoteDirection>> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (2..=post_ids.len() + 1).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT post_id, value FROM votes WHERE user_id = ?1 AND post_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params = std::iter::once(viewer).chain(post_ids.iter().copied());

    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut statuses = HashMap::with_capacity(rows.len());
    for (post_id, value) in rows {
        statuses.insert(post_id, VoteDirection::try_from(value)?);
    }
    Ok(statuses)
}
