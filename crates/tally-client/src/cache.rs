//! Normalized client-side cache for the feed.
//!
//! Posts are stored once, keyed by id; each fetched feed page only keeps the
//! ids it returned, so an update to a post shows up in every page holding it.
//!
//! Mutation rules:
//! - vote: apply [`vote_delta`] against the cached vote status, exactly as
//!   the server does, and write back `points` and `voteStatus`
//! - create post: drop every cached page; where the new post sits relative
//!   to the cached cursors cannot be worked out locally
//! - login / logout: drop every cached page and post, vote status is per
//!   viewer
//! - update post: overwrite the cached post
//! - delete post: evict the post and remove it from cached pages

use std::collections::HashMap;

use tally_types::api::{PaginatedPosts, PostResponse};
use tally_types::models::{VoteDirection, vote_delta};

#[derive(Debug, Clone)]
struct CachedPage {
    /// The cursor this page was requested with.
    cursor: Option<String>,
    post_ids: Vec<i64>,
    has_more: bool,
    next_cursor: Option<String>,
}

/// The cached pages merged into one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView<'a> {
    pub posts: Vec<&'a PostResponse>,
    pub has_more: bool,
    pub next_cursor: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    posts: HashMap<i64, PostResponse>,
    pages: Vec<CachedPage>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a page fetched with `cursor`. Refetching the same cursor
    /// replaces the earlier copy in place.
    pub fn store_page(&mut self, cursor: Option<&str>, page: PaginatedPosts) {
        let post_ids = page.posts.iter().map(|p| p.id).collect();
        for post in page.posts {
            self.posts.insert(post.id, post);
        }

        let cached = CachedPage {
            cursor: cursor.map(str::to_string),
            post_ids,
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        };

        match self.pages.iter_mut().find(|p| p.cursor == cached.cursor) {
            Some(existing) => *existing = cached,
            None => self.pages.push(cached),
        }
    }

    /// All cached pages in fetch order, or `None` when the feed has to be
    /// fetched. `has_more` is false as soon as any page reported the end.
    pub fn feed(&self) -> Option<FeedView<'_>> {
        if self.pages.is_empty() {
            return None;
        }

        let posts = self
            .pages
            .iter()
            .flat_map(|page| page.post_ids.iter())
            .filter_map(|id| self.posts.get(id))
            .collect();

        Some(FeedView {
            posts,
            has_more: self.pages.iter().all(|p| p.has_more),
            next_cursor: self.pages.last().and_then(|p| p.next_cursor.as_deref()),
        })
    }

    /// Cursor to request the next page with, if there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.feed()
            .filter(|view| view.has_more)
            .and_then(|view| view.next_cursor)
    }

    pub fn post(&self, id: i64) -> Option<&PostResponse> {
        self.posts.get(&id)
    }

    pub fn store_post(&mut self, post: PostResponse) {
        self.posts.insert(post.id, post);
    }

    /// Applies a successful vote to the cached post. Returns whether the
    /// cached copy changed; an uncached post or a repeated vote changes
    /// nothing.
    pub fn apply_vote(&mut self, post_id: i64, direction: VoteDirection) -> bool {
        let Some(post) = self.posts.get_mut(&post_id) else {
            return false;
        };

        let delta = vote_delta(post.vote_status, direction);
        if delta == 0 {
            return false;
        }

        post.points += delta;
        post.vote_status = Some(direction);
        true
    }

    pub fn remove_post(&mut self, id: i64) {
        self.posts.remove(&id);
        for page in &mut self.pages {
            page.post_ids.retain(|&post_id| post_id != id);
        }
    }

    pub fn invalidate_feed(&mut self) {
        self.pages.clear();
    }

    pub fn clear(&mut self) {
        self.posts.clear();
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::api::Creator;
    use VoteDirection::{Down, Up};

    fn post(id: i64, points: i64, vote_status: Option<VoteDirection>) -> PostResponse {
        PostResponse {
            id,
            title: format!("post {id}"),
            text: "body".to_string(),
            text_snippet: "body".to_string(),
            points,
            vote_status,
            creator: Creator {
                id: 1,
                username: "ada".to_string(),
            },
            created_at: Default::default(),
            updated_at: Default::default(),
        }
    }

    fn page(posts: Vec<PostResponse>, has_more: bool) -> PaginatedPosts {
        let next_cursor = posts.last().map(|p| format!("after-{}", p.id));
        PaginatedPosts {
            posts,
            has_more,
            next_cursor,
        }
    }

    fn feed_ids(cache: &FeedCache) -> Vec<i64> {
        cache.feed().unwrap().posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn pages_merge_in_fetch_order() {
        let mut cache = FeedCache::new();
        assert!(cache.feed().is_none());

        cache.store_page(None, page(vec![post(3, 0, None), post(2, 0, None)], true));
        assert_eq!(cache.next_cursor(), Some("after-2"));

        cache.store_page(Some("after-2"), page(vec![post(1, 0, None)], false));

        let view = cache.feed().unwrap();
        assert_eq!(feed_ids(&cache), vec![3, 2, 1]);
        assert!(!view.has_more);
        assert_eq!(cache.next_cursor(), None);
    }

    #[test]
    fn refetching_a_cursor_replaces_that_page() {
        let mut cache = FeedCache::new();
        cache.store_page(None, page(vec![post(2, 0, None)], true));
        cache.store_page(None, page(vec![post(5, 0, None), post(2, 0, None)], true));

        assert_eq!(feed_ids(&cache), vec![5, 2]);
    }

    #[test]
    fn vote_updates_follow_the_delta_rule() {
        let mut cache = FeedCache::new();
        cache.store_post(post(1, 10, None));

        assert!(cache.apply_vote(1, Up));
        assert_eq!(cache.post(1).unwrap().points, 11);

        assert!(!cache.apply_vote(1, Up));
        assert_eq!(cache.post(1).unwrap().points, 11);

        assert!(cache.apply_vote(1, Down));
        let cached = cache.post(1).unwrap();
        assert_eq!(cached.points, 9);
        assert_eq!(cached.vote_status, Some(Down));

        assert!(!cache.apply_vote(42, Up));
    }

    #[test]
    fn vote_is_visible_through_every_page() {
        let mut cache = FeedCache::new();
        cache.store_page(None, page(vec![post(1, 0, Some(Down))], true));

        cache.apply_vote(1, Up);

        let view = cache.feed().unwrap();
        assert_eq!(view.posts[0].points, 2);
        assert_eq!(view.posts[0].vote_status, Some(Up));
    }

    #[test]
    fn invalidation_drops_pages_but_keeps_posts() {
        let mut cache = FeedCache::new();
        cache.store_page(None, page(vec![post(1, 0, None)], false));

        cache.invalidate_feed();
        assert!(cache.feed().is_none());
        assert!(cache.post(1).is_some());

        cache.clear();
        assert!(cache.post(1).is_none());
    }

    #[test]
    fn removed_post_leaves_every_page() {
        let mut cache = FeedCache::new();
        cache.store_page(None, page(vec![post(3, 0, None), post(2, 0, None)], true));
        cache.store_page(Some("after-2"), page(vec![post(1, 0, None)], false));

        cache.remove_post(2);

        assert_eq!(feed_ids(&cache), vec![3, 1]);
        assert!(cache.post(2).is_none());
    }
}
