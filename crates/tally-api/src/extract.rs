use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::AppState;
use crate::auth::decode_token;
use crate::error::ApiError;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The caller, taken from a valid bearer token. Rejects the request with
/// 401 before the handler runs when the token is missing or invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            AuthorizationHeader::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    if rejection.is_missing() {
                        ApiError::NotAuthenticated
                    } else {
                        ApiError::InvalidAuthorizationHeader(rejection)
                    }
                })?;

        let state = AppState::from_ref(state);
        let claims = decode_token(&state.jwt_secret, bearer.token())?;

        Ok(Self {
            id: claims.sub,
            username: claims.username,
        })
    }
}

/// Optional caller identity for public reads. Anonymous when no token is
/// sent or the token does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewer(pub Option<i64>);

impl<S> FromRequestParts<S> for Viewer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(Self(None));
        }

        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user.id))),
            Err(err) => {
                debug!(error = %err, "Treating caller as anonymous");
                Ok(Self(None))
            }
        }
    }
}
