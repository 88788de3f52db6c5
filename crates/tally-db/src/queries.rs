use crate::feed::vote_statuses;
use crate::models::{FeedPost, PostRow, UserRow};
use crate::{Database, now_millis};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

pub(crate) const POST_COLUMNS: &str = "p.id, p.title, p.text, p.points, p.creator_id, u.username, p.created_at, p.updated_at";

const USER_COLUMNS: &str = "id, username, email, password, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

pub enum NewUser {
    Created(UserRow),
    Taken(UniqueField),
}

/// Outcome of a write that only the post's creator may perform.
#[derive(Debug)]
pub enum OwnedWrite<T> {
    Done(T),
    NotFound,
    NotOwner,
}

impl Database {
    // -- Users --

    /// Inserts a user. Unique-constraint hits come back as `Taken` rather
    /// than as errors.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<NewUser> {
        let now = now_millis();

        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![username, email, password_hash, now],
            );

            match inserted {
                Ok(_) => Ok(NewUser::Created(UserRow {
                    id: conn.last_insert_rowid(),
                    username: username.to_string(),
                    email: email.to_string(),
                    password: password_hash.to_string(),
                    created_at: now,
                    updated_at: now,
                })),
                Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    // "UNIQUE constraint failed: users.email"
                    if msg.contains("users.email") {
                        Ok(NewUser::Taken(UniqueField::Email))
                    } else {
                        Ok(NewUser::Taken(UniqueField::Username))
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Posts --

    pub fn create_post(&self, creator_id: i64, title: &str, text: &str) -> Result<PostRow> {
        self.create_post_at(creator_id, title, text, now_millis())
    }

    /// Inserts a post with an explicit creation time (unix millis).
    pub fn create_post_at(
        &self,
        creator_id: i64,
        title: &str,
        text: &str,
        created_at: i64,
    ) -> Result<PostRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (title, text, creator_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![title, text, creator_id, created_at],
            )?;
            let id = conn.last_insert_rowid();

            query_post(conn, id)?.ok_or_else(|| anyhow::anyhow!("Post {} vanished after insert", id))
        })
    }

    /// A single post annotated with `viewer`'s vote.
    pub fn get_post(&self, id: i64, viewer: Option<i64>) -> Result<Option<FeedPost>> {
        self.with_conn(|conn| {
            let Some(post) = query_post(conn, id)? else {
                return Ok(None);
            };
            let vote_status = match viewer {
                Some(viewer) => vote_statuses(conn, viewer, &[id])?.remove(&id),
                None => None,
            };

            Ok(Some(FeedPost { post, vote_status }))
        })
    }

    /// Edits title and/or text. Returns the post as its creator sees it.
    pub fn update_post(
        &self,
        id: i64,
        editor_id: i64,
        title: Option<&str>,
        text: Option<&str>,
    ) -> Result<OwnedWrite<FeedPost>> {
        let now = now_millis();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match post_creator(&tx, id)? {
                None => return Ok(OwnedWrite::NotFound),
                Some(creator) if creator != editor_id => return Ok(OwnedWrite::NotOwner),
                Some(_) => {}
            }

            if title.is_some() || text.is_some() {
                tx.execute(
                    "UPDATE posts
                     SET title = COALESCE(?1, title),
                         text = COALESCE(?2, text),
                         updated_at = ?3
                     WHERE id = ?4",
                    rusqlite::params![title, text, now, id],
                )?;
            }

            let post = query_post(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Post {} vanished during update", id))?;
            let vote_status = vote_statuses(&tx, editor_id, &[id])?.remove(&id);
            tx.commit()?;

            Ok(OwnedWrite::Done(FeedPost { post, vote_status }))
        })
    }

    /// Deletes a post and, through the foreign key cascade, all its votes.
    pub fn delete_post(&self, id: i64, editor_id: i64) -> Result<OwnedWrite<()>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match post_creator(&tx, id)? {
                None => return Ok(OwnedWrite::NotFound),
                Some(creator) if creator != editor_id => return Ok(OwnedWrite::NotOwner),
                Some(_) => {}
            }

            tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            tx.commit()?;

            Ok(OwnedWrite::Done(()))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: impl rusqlite::ToSql) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_post(conn: &Connection, id: i64) -> Result<Option<PostRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         JOIN users u ON u.id = p.creator_id
         WHERE p.id = ?1"
    ))?;

    Ok(stmt.query_row([id], post_from_row).optional()?)
}

pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        points: row.get(3)?,
        creator_id: row.get(4)?,
        creator_username: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn post_creator(conn: &Connection, id: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT creator_id FROM posts WHERE id = ?1", [id], |row| row.get(0))
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use tally_types::models::VoteDirection;

    #[test]
    fn duplicate_username_and_email_are_reported_per_field() {
        let db = Database::open_in_memory().unwrap();
        test_support::user(&db, "ada");

        let dup_name = db.create_user("ada", "other@example.com", "h").unwrap();
        assert!(matches!(dup_name, NewUser::Taken(UniqueField::Username)));

        let dup_email = db.create_user("grace", "ada@example.com", "h").unwrap();
        assert!(matches!(dup_email, NewUser::Taken(UniqueField::Email)));
    }

    #[test]
    fn users_are_found_by_name_email_and_id() {
        let db = Database::open_in_memory().unwrap();
        let id = test_support::user(&db, "ada");

        assert_eq!(db.get_user_by_username("ada").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_email("ada@example.com").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_id(id).unwrap().unwrap().username, "ada");
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn new_post_starts_at_zero_points_with_creator_joined() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");

        let post = db.create_post(ada, "hello", "world").unwrap();
        assert_eq!(post.points, 0);
        assert_eq!(post.creator_id, ada);
        assert_eq!(post.creator_username, "ada");
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn get_post_carries_viewer_vote() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let bob = test_support::user(&db, "bob");
        let post = db.create_post(ada, "t", "x").unwrap();

        db.apply_vote(bob, post.id, VoteDirection::Down).unwrap().unwrap();

        let for_bob = db.get_post(post.id, Some(bob)).unwrap().unwrap();
        assert_eq!(for_bob.vote_status, Some(VoteDirection::Down));
        let for_ada = db.get_post(post.id, Some(ada)).unwrap().unwrap();
        assert_eq!(for_ada.vote_status, None);
        let anonymous = db.get_post(post.id, None).unwrap().unwrap();
        assert_eq!(anonymous.vote_status, None);

        assert!(db.get_post(post.id + 100, None).unwrap().is_none());
    }

    #[test]
    fn only_the_creator_may_update() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let bob = test_support::user(&db, "bob");
        let post = test_support::post_at(&db, ada, "before", 1_000);

        assert!(matches!(
            db.update_post(post, bob, Some("hijack"), None).unwrap(),
            OwnedWrite::NotOwner
        ));
        assert!(matches!(
            db.update_post(post + 1, ada, Some("x"), None).unwrap(),
            OwnedWrite::NotFound
        ));

        let OwnedWrite::Done(updated) = db.update_post(post, ada, Some("after"), None).unwrap() else {
            panic!("creator update rejected");
        };
        assert_eq!(updated.post.title, "after");
        assert_eq!(updated.post.text, "body");
        assert_eq!(updated.post.created_at, 1_000);
        assert!(updated.post.updated_at > 1_000);
    }

    #[test]
    fn delete_cascades_to_votes() {
        let db = Database::open_in_memory().unwrap();
        let ada = test_support::user(&db, "ada");
        let bob = test_support::user(&db, "bob");
        let post = test_support::post_at(&db, ada, "t", 1_000);
        db.apply_vote(bob, post, VoteDirection::Up).unwrap().unwrap();

        assert!(matches!(db.delete_post(post, bob).unwrap(), OwnedWrite::NotOwner));
        assert!(matches!(db.delete_post(post, ada).unwrap(), OwnedWrite::Done(())));
        assert!(matches!(db.delete_post(post, ada).unwrap(), OwnedWrite::NotFound));

        let votes: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM votes WHERE post_id = ?1", [post], |r| {
                    r.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(votes, 0);
    }
}
