use axum::{
    Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;

use tally_types::api::{VoteRequest, VoteResponse};
use tally_types::models::VoteDirection;

use crate::error::{ApiError, Result};
use crate::extract::AuthUser;
use crate::{AppState, with_db};

/// Up- or downvote a post. Repeating the current vote is accepted and
/// changes nothing.
pub async fn vote(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(post_id), _): WithRejection<Path<i64>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<VoteRequest>, ApiError>,
) -> Result<Json<VoteResponse>> {
    let direction = VoteDirection::from_value(req.value);
    let user_id = user.id;

    let receipt = with_db(&state, move |db| Ok(db.apply_vote(user_id, post_id, direction)?))
        .await?
        .ok_or(ApiError::PostNotFound(post_id))?;

    Ok(Json(VoteResponse {
        success: true,
        points: receipt.points,
        vote_status: receipt.vote_status,
    }))
}
