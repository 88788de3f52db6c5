use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use tally_types::api::{
    AuthResponse, CreatePostRequest, ErrorResponse, FieldError, LoginRequest, PaginatedPosts,
    PostResponse, RegisterRequest, UpdatePostRequest, UserResponse, VoteResponse,
};
use tally_types::models::VoteDirection;

use crate::cache::FeedCache;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server replied {status}: {message}")]
    Api {
        status: u16,
        message: String,
        errors: Vec<FieldError>,
    },
}

impl ClientError {
    /// Field-level errors the server reported, if any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ClientError::Api { errors, .. } => errors,
            ClientError::Http(_) => &[],
        }
    }
}

/// HTTP client that keeps a [`FeedCache`] in step with its own mutations.
pub struct TallyClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cache: FeedCache,
}

impl TallyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            cache: FeedCache::new(),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // -- Auth --

    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserResponse> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = parse(
            self.request(Method::POST, "/auth/register")
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        self.token = Some(auth.token);
        self.cache.clear();
        Ok(auth.user)
    }

    pub async fn login(&mut self, username_or_email: &str, password: &str) -> Result<UserResponse> {
        let body = LoginRequest {
            username_or_email: username_or_email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = parse(
            self.request(Method::POST, "/auth/login")
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        self.token = Some(auth.token);
        self.cache.clear();
        Ok(auth.user)
    }

    /// Forgets the token and everything cached for it.
    pub fn logout(&mut self) {
        self.token = None;
        self.cache.clear();
    }

    pub async fn me(&self) -> Result<Option<UserResponse>> {
        parse(self.request(Method::GET, "/me").send().await?).await
    }

    // -- Feed --

    /// Fetches the page after `cursor` (the newest page when `None`) into
    /// the cache.
    pub async fn fetch_page(&mut self, limit: i64, cursor: Option<&str>) -> Result<()> {
        let mut request = self
            .request(Method::GET, "/posts")
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let page: PaginatedPosts = parse(request.send().await?).await?;
        debug!(posts = page.posts.len(), has_more = page.has_more, "Fetched feed page");
        self.cache.store_page(cursor, page);
        Ok(())
    }

    /// Fetches the first page if nothing is cached, else the page after the
    /// cached ones. Returns `false` once the feed is exhausted.
    pub async fn load_more(&mut self, limit: i64) -> Result<bool> {
        if self.cache.feed().is_none() {
            self.fetch_page(limit, None).await?;
            return Ok(true);
        }

        let Some(cursor) = self.cache.next_cursor().map(str::to_string) else {
            return Ok(false);
        };
        self.fetch_page(limit, Some(&cursor)).await?;
        Ok(true)
    }

    pub async fn post(&mut self, id: i64) -> Result<PostResponse> {
        let post: PostResponse =
            parse(self.request(Method::GET, &format!("/posts/{id}")).send().await?).await?;
        self.cache.store_post(post.clone());
        Ok(post)
    }

    // -- Mutations --

    pub async fn create_post(&mut self, title: &str, text: &str) -> Result<PostResponse> {
        let body = CreatePostRequest {
            title: title.to_string(),
            text: text.to_string(),
        };
        let post: PostResponse =
            parse(self.request(Method::POST, "/posts").json(&body).send().await?).await?;

        self.cache.invalidate_feed();
        self.cache.store_post(post.clone());
        Ok(post)
    }

    pub async fn update_post(
        &mut self,
        id: i64,
        title: Option<&str>,
        text: Option<&str>,
    ) -> Result<PostResponse> {
        let body = UpdatePostRequest {
            title: title.map(str::to_string),
            text: text.map(str::to_string),
        };
        let post: PostResponse = parse(
            self.request(Method::PUT, &format!("/posts/{id}"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        self.cache.store_post(post.clone());
        Ok(post)
    }

    pub async fn delete_post(&mut self, id: i64) -> Result<()> {
        let _: bool = parse(
            self.request(Method::DELETE, &format!("/posts/{id}"))
                .send()
                .await?,
        )
        .await?;

        self.cache.remove_post(id);
        Ok(())
    }

    /// Votes on a post and, once the server accepts, moves the cached score
    /// with the same delta rule the server used.
    pub async fn vote(&mut self, post_id: i64, direction: VoteDirection) -> Result<VoteResponse> {
        let response: VoteResponse = parse(
            self.request(Method::POST, &format!("/posts/{post_id}/vote"))
                .json(&json!({ "value": direction.value() }))
                .send()
                .await?,
        )
        .await?;

        if response.success {
            self.cache.apply_vote(post_id, direction);
        }
        Ok(response)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response
        .json::<ErrorResponse>()
        .await
        .unwrap_or_else(|_| ErrorResponse {
            status: status.as_u16(),
            message: status.to_string(),
            errors: Vec::new(),
        });
    warn!(status = body.status, message = %body.message, "Request rejected");

    Err(ClientError::Api {
        status: status.as_u16(),
        message: body.message,
        errors: body.errors,
    })
}
