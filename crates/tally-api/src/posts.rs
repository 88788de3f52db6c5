use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::info;

use tally_db::models::{FeedPost, millis_to_datetime};
use tally_db::queries::OwnedWrite;
use tally_types::api::{
    CreatePostRequest, Creator, PaginatedPosts, PostResponse, UpdatePostRequest,
};
use tally_types::models::{FeedCursor, text_snippet};

use crate::error::{ApiError, Result};
use crate::extract::{AuthUser, Viewer};
use crate::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// `nextCursor` from the previous page; absent for the newest posts.
    pub cursor: Option<String>,
}

fn default_limit() -> i64 {
    10
}

pub async fn list_posts(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    WithRejection(Query(query), _): WithRejection<Query<FeedQuery>, ApiError>,
) -> Result<Json<PaginatedPosts>> {
    let cursor = query
        .cursor
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(str::parse::<FeedCursor>)
        .transpose()
        .map_err(|e| ApiError::invalid("cursor", e.to_string()))?;

    let page = with_db(&state, move |db| Ok(db.fetch_page(query.limit, cursor, viewer)?)).await?;

    let next_cursor = page.next_cursor().map(|c| c.encode());
    Ok(Json(PaginatedPosts {
        posts: page.posts.into_iter().map(post_response).collect(),
        has_more: page.has_more,
        next_cursor,
    }))
}

pub async fn get_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<Json<PostResponse>> {
    let post = with_db(&state, move |db| Ok(db.get_post(id, viewer)?))
        .await?
        .ok_or(ApiError::PostNotFound(id))?;

    Ok(Json(post_response(post)))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(req), _): WithRejection<Json<CreatePostRequest>, ApiError>,
) -> Result<impl IntoResponse> {
    if req.title.trim().is_empty() {
        return Err(ApiError::invalid("title", "Title is required."));
    }

    let creator_id = user.id;
    let post = with_db(&state, move |db| {
        Ok(db.create_post(creator_id, &req.title, &req.text)?)
    })
    .await?;

    info!(post_id = post.id, creator_id, "Post created");
    Ok((
        StatusCode::CREATED,
        Json(post_response(FeedPost {
            post,
            vote_status: None,
        })),
    ))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<UpdatePostRequest>, ApiError>,
) -> Result<Json<PostResponse>> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::invalid("title", "Title is required."));
    }

    let editor_id = user.id;
    let written = with_db(&state, move |db| {
        Ok(db.update_post(id, editor_id, req.title.as_deref(), req.text.as_deref())?)
    })
    .await?;

    match written {
        OwnedWrite::Done(post) => Ok(Json(post_response(post))),
        OwnedWrite::NotFound => Err(ApiError::PostNotFound(id)),
        OwnedWrite::NotOwner => Err(ApiError::NotOwner(id)),
    }
}

/// Deletes a post together with its votes.
pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<i64>, ApiError>,
) -> Result<Json<bool>> {
    let editor_id = user.id;
    let written = with_db(&state, move |db| Ok(db.delete_post(id, editor_id)?)).await?;

    match written {
        OwnedWrite::Done(()) => {
            info!(post_id = id, "Post deleted");
            Ok(Json(true))
        }
        OwnedWrite::NotFound => Err(ApiError::PostNotFound(id)),
        OwnedWrite::NotOwner => Err(ApiError::NotOwner(id)),
    }
}

pub fn post_response(FeedPost { post, vote_status }: FeedPost) -> PostResponse {
    PostResponse {
        id: post.id,
        text_snippet: text_snippet(&post.text),
        title: post.title,
        text: post.text,
        points: post.points,
        vote_status,
        creator: Creator {
            id: post.creator_id,
            username: post.creator_username,
        },
        created_at: millis_to_datetime(post.created_at),
        updated_at: millis_to_datetime(post.updated_at),
    }
}
