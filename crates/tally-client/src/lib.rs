//! Client for the tally API with a normalized feed cache.

pub mod cache;
pub mod client;

pub use cache::{FeedCache, FeedView};
pub use client::{ClientError, TallyClient};
