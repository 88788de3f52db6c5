use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use tally_db::models::{UserRow, millis_to_datetime};
use tally_db::queries::{NewUser, UniqueField};
use tally_types::api::{
    AuthResponse, Claims, FieldError, LoginRequest, RegisterRequest, UserResponse,
};

use crate::error::{ApiError, Result};
use crate::extract::Viewer;
use crate::{AppState, with_db};

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse> {
    let errors = validate_register(&req);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = with_db(&state, move |db| {
        let password_hash = hash_password(&req.password)?;

        match db.create_user(&req.username, &req.email, &password_hash)? {
            NewUser::Created(user) => Ok(user),
            NewUser::Taken(UniqueField::Username) => Err(ApiError::Conflict(FieldError::new(
                "username",
                "Username already exists.",
            ))),
            NewUser::Taken(UniqueField::Email) => Err(ApiError::Conflict(FieldError::new(
                "email",
                "Email already in use.",
            ))),
        }
    })
    .await?;

    info!(user_id = user.id, username = %user.username, "User registered");
    let token = create_token(&state, user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user_response(&user, Some(user.id)),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<AuthResponse>> {
    let user = with_db(&state, move |db| {
        let user = if req.username_or_email.contains('@') {
            db.get_user_by_email(&req.username_or_email)?
        } else {
            db.get_user_by_username(&req.username_or_email)?
        };

        let user = user.ok_or_else(|| {
            ApiError::Credentials(FieldError::new("usernameOrEmail", "User doesn't exist."))
        })?;

        if !verify_password(&user.password, &req.password)? {
            return Err(ApiError::Credentials(FieldError::new(
                "password",
                "Incorrect password.",
            )));
        }

        Ok(user)
    })
    .await?;

    let token = create_token(&state, user.id, &user.username)?;

    Ok(Json(AuthResponse {
        user: user_response(&user, Some(user.id)),
        token,
    }))
}

/// The caller's own user, or `null` when anonymous.
pub async fn me(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> Result<Json<Option<UserResponse>>> {
    let Some(viewer) = viewer else {
        return Ok(Json(None));
    };

    let user = with_db(&state, move |db| Ok(db.get_user_by_id(viewer)?)).await?;

    Ok(Json(user.map(|user| user_response(&user, Some(viewer)))))
}

/// Checks registration input and reports every failing field.
pub fn validate_register(req: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if req.username.chars().count() <= 2 {
        errors.push(FieldError::new("username", "Length must be greater than 2."));
    }
    if req.username.contains('@') {
        errors.push(FieldError::new("username", "Cannot include an @."));
    }
    if !req.email.contains('@') {
        errors.push(FieldError::new("email", "Invalid email."));
    }
    if req.password.chars().count() <= 3 {
        errors.push(FieldError::new("password", "Length must be greater than 3."));
    }

    errors
}

/// Email is only shown to the user it belongs to.
pub fn user_response(user: &UserRow, viewer: Option<i64>) -> UserResponse {
    UserResponse {
        id: user.id,
        username: user.username.clone(),
        email: if viewer == Some(user.id) {
            user.email.clone()
        } else {
            String::new()
        },
        created_at: millis_to_datetime(user.created_at),
        updated_at: millis_to_datetime(user.updated_at),
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ApiError::PasswordHash)
}

fn verify_password(stored_hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(ApiError::PasswordHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ApiError::PasswordHash(e)),
    }
}

fn create_token(state: &AppState, user_id: i64, username: &str) -> Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(ApiError::TokenEncode)
}

pub(crate) fn decode_token(secret: &str, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn valid_registration_passes() {
        assert!(validate_register(&request("ada", "ada@example.com", "hunter2")).is_empty());
    }

    #[test]
    fn every_bad_field_is_reported() {
        let errors = validate_register(&request("a@", "nope", "abc"));
        assert_eq!(fields(&errors), vec!["username", "username", "email", "password"]);
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn email_hidden_from_other_viewers() {
        let user = UserRow {
            id: 7,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "hash".to_string(),
            created_at: 0,
            updated_at: 0,
        };

        assert_eq!(user_response(&user, Some(7)).email, "ada@example.com");
        assert_eq!(user_response(&user, Some(8)).email, "");
        assert_eq!(user_response(&user, None).email, "");
    }
}
