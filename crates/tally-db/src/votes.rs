use anyhow::Result;
use rusqlite::{OptionalExtension, TransactionBehavior};
use tally_types::models::{VoteDirection, vote_delta};
use tracing::debug;

use crate::Database;

/// How a vote changed the viewer's stored vote on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    /// First vote on this post.
    Cast,
    /// Replaced an opposite vote.
    Flipped,
    /// Repeated the current vote; nothing was written.
    Unchanged,
}

impl VoteTransition {
    pub fn between(previous: Option<VoteDirection>, next: VoteDirection) -> Self {
        match previous {
            None => Self::Cast,
            Some(prev) if prev == next => Self::Unchanged,
            Some(_) => Self::Flipped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub transition: VoteTransition,
    /// Post score after the vote.
    pub points: i64,
    pub vote_status: VoteDirection,
}

impl Database {
    /// Records `user_id`'s vote on `post_id` and moves the post score to
    /// match, both inside one immediate transaction. Returns `None` if the
    /// post does not exist.
    pub fn apply_vote(
        &self,
        user_id: i64,
        post_id: i64,
        direction: VoteDirection,
    ) -> Result<Option<VoteReceipt>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let points: Option<i64> = tx
                .query_row("SELECT points FROM posts WHERE id = ?1", [post_id], |row| row.get(0))
                .optional()?;
            let Some(points) = points else {
                return Ok(None);
            };

            let previous = tx
                .query_row(
                    "SELECT value FROM votes WHERE user_id = ?1 AND post_id = ?2",
                    [user_id, post_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(VoteDirection::try_from)
                .transpose()?;

            let transition = VoteTransition::between(previous, direction);
            let delta = vote_delta(previous, direction);

            match transition {
                VoteTransition::Unchanged => {
                    debug!(user_id, post_id, "Repeated vote ignored");
                    return Ok(Some(VoteReceipt {
                        transition,
                        points,
                        vote_status: direction,
                    }));
                }
                VoteTransition::Cast => {
                    tx.execute(
                        "INSERT INTO votes (user_id, post_id, value) VALUES (?1, ?2, ?3)",
                        [user_id, post_id, direction.value()],
                    )?;
                }
                VoteTransition::Flipped => {
                    tx.execute(
                        "UPDATE votes SET value = ?1 WHERE user_id = ?2 AND post_id = ?3",
                        [direction.value(), user_id, post_id],
                    )?;
                }
            }

            tx.execute(
                "UPDATE posts SET points = points + ?1 WHERE id = ?2",
                [delta, post_id],
            )?;
            tx.commit()?;

            debug!(user_id, post_id, ?transition, delta, "Vote applied");
            Ok(Some(VoteReceipt {
                transition,
                points: points + delta,
                vote_status: direction,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use std::sync::Arc;
    use std::thread;
    use VoteDirection::{Down, Up};

    fn vote_count(db: &Database, post_id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM votes WHERE post_id = ?1", [post_id], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn first_vote_moves_score_by_one() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let post = test_support::post_at(&db, ada, "t", 1);

        let receipt = db.apply_vote(ada, post, Down).unwrap().unwrap();
        assert_eq!(receipt.transition, VoteTransition::Cast);
        assert_eq!(receipt.points, -1);
        assert_eq!(test_support::points(&db, post), -1);
    }

    #[test]
    fn repeated_vote_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let post = test_support::post_at(&db, ada, "t", 1);

        db.apply_vote(ada, post, Up).unwrap().unwrap();
        let again = db.apply_vote(ada, post, Up).unwrap().unwrap();

        assert_eq!(again.transition, VoteTransition::Unchanged);
        assert_eq!(again.points, 1);
        assert_eq!(test_support::points(&db, post), 1);
        assert_eq!(vote_count(&db, post), 1);
    }

    #[test]
    fn flip_moves_score_by_two() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let post = test_support::post_at(&db, ada, "t", 1);

        let up = db.apply_vote(ada, post, Up).unwrap().unwrap();
        let down = db.apply_vote(ada, post, Down).unwrap().unwrap();

        assert_eq!(down.transition, VoteTransition::Flipped);
        assert_eq!(down.points - up.points, -2);
        assert_eq!(vote_count(&db, post), 1);
    }

    #[test]
    fn missing_post_is_rejected_without_writes() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");

        assert!(db.apply_vote(ada, 999, Up).unwrap().is_none());
        assert_eq!(vote_count(&db, 999), 0);
    }

    #[test]
    fn score_always_matches_vote_rows() {
        let db = Database::open_in_memory().unwrap();
        let users: Vec<i64> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| test_support::user(&db, name))
            .collect();
        let posts: Vec<i64> = (0..3)
            .map(|i| test_support::post_at(&db, users[0], "t", i))
            .collect();

        // Deterministic but irregular replay over every (user, post) pair.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..400 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let user = users[(seed % 4) as usize];
            let post = posts[((seed >> 8) % 3) as usize];
            let direction = if (seed >> 16) % 2 == 0 { Up } else { Down };

            db.apply_vote(user, post, direction).unwrap().unwrap();
        }

        for post in posts {
            assert_eq!(test_support::points(&db, post), test_support::vote_sum(&db, post));
            assert!(vote_count(&db, post) <= users.len() as i64);
        }
    }

    #[test]
    fn concurrent_votes_do_not_drift() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let users: Vec<i64> = (0..8)
            .map(|i| test_support::user(&db, &format!("user{i}")))
            .collect();
        let post = test_support::post_at(&db, users[0], "t", 1);

        let handles: Vec<_> = users
            .iter()
            .copied()
            .map(|user| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for round in 0..25 {
                        let direction = if (round + user) % 3 == 0 { Down } else { Up };
                        db.apply_vote(user, post, direction).unwrap().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(test_support::points(&db, post), test_support::vote_sum(&db, post));
        assert_eq!(vote_count(&db, post), users.len() as i64);
    }
}
