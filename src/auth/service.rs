use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::error::ApiError;
use crate::users::repo::{NewUser, Role, User, UserStatus};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// At least 6 chars, one uppercase, one lowercase, one digit or symbol.
pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 6 {
        return Err(ApiError::Validation {
            field: "password",
            message: "password must be at least 6 characters".into(),
        });
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ApiError::Validation {
            field: "password",
            message: "password must contain an uppercase letter".into(),
        });
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ApiError::Validation {
            field: "password",
            message: "password must contain a lowercase letter".into(),
        });
    }
    if !password.chars().any(|c| !c.is_alphabetic()) {
        return Err(ApiError::Validation {
            field: "password",
            message: "password must contain a digit or symbol".into(),
        });
    }
    Ok(())
}

pub async fn register(
    db: &PgPool,
    keys: &JwtKeys,
    mut payload: RegisterRequest,
) -> Result<AuthResponse, ApiError> {
    payload.email = payload.email.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation {
            field: "email",
            message: "invalid email".into(),
        });
    }
    validate_password(&payload.password)?;

    // ADMIN is never self-assigned; privileged accounts go through /users
    let role = match payload.role {
        Some(Role::Admin) => {
            warn!(email = %payload.email, "attempted self-registration as admin");
            return Err(ApiError::Validation {
                field: "role",
                message: "role ADMIN cannot be self-assigned".into(),
            });
        }
        Some(role) => role,
        None => Role::Customer,
    };

    if User::find_by_email(db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        db,
        &NewUser {
            email: &payload.email,
            password_hash: &hash,
            first_name: payload.first_name.as_deref(),
            last_name: payload.last_name.as_deref(),
            phone: payload.phone.as_deref(),
            role,
        },
    )
    .await?;

    let token = keys.sign(&user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(AuthResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: keys.expires_in_secs(),
        user: user.into(),
    })
}

pub async fn login(
    db: &PgPool,
    keys: &JwtKeys,
    mut payload: LoginRequest,
) -> Result<AuthResponse, ApiError> {
    payload.email = payload.email.trim().to_string();

    // Unknown email and wrong password must be indistinguishable
    let Some(user) = User::find_by_email(db, &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    if user.status != UserStatus::Active {
        warn!(user_id = %user.id, status = ?user.status, "login on inactive account");
        return Err(ApiError::AccountNotActive);
    }

    let token = keys.sign(&user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: keys.expires_in_secs(),
        user: user.into(),
    })
}

pub async fn profile(db: &PgPool, user_id: Uuid) -> Result<PublicUser, ApiError> {
    let user = User::find_by_id(db, user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@shop.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("spaces in@b.com"));
        assert!(!is_valid_email("@b.com"));
    }

    #[test]
    fn password_policy_accepts_compliant_passwords() {
        assert!(validate_password("Test123!").is_ok());
        assert!(validate_password("Abc12!").is_ok());
        assert!(validate_password("Aa!!!!").is_ok()); // symbol counts as digit-or-symbol
    }

    // Validation runs before any directory access, so these never touch the
    // lazily-connecting pool
    mod register_validation {
        use super::*;
        use crate::state::AppState;
        use axum::extract::FromRef;

        fn request(email: &str, password: &str, role: Option<Role>) -> RegisterRequest {
            RegisterRequest {
                email: email.into(),
                password: password.into(),
                first_name: None,
                last_name: None,
                phone: None,
                role,
            }
        }

        async fn register_err(req: RegisterRequest) -> ApiError {
            let state = AppState::fake();
            let keys = JwtKeys::from_ref(&state);
            register(&state.db, &keys, req).await.unwrap_err()
        }

        #[tokio::test]
        async fn rejects_malformed_email() {
            let err = register_err(request("not-an-email", "Test123!", None)).await;
            assert!(matches!(err, ApiError::Validation { field: "email", .. }));
        }

        #[tokio::test]
        async fn rejects_weak_password() {
            let err = register_err(request("a@b.com", "short", None)).await;
            assert!(matches!(err, ApiError::Validation { field: "password", .. }));
        }

        #[tokio::test]
        async fn rejects_self_assigned_admin() {
            let err = register_err(request("a@b.com", "Test123!", Some(Role::Admin))).await;
            assert!(matches!(err, ApiError::Validation { field: "role", .. }));
        }
    }

    #[test]
    fn password_policy_rejects_weak_passwords() {
        let field = |r: Result<(), ApiError>| match r.unwrap_err() {
            ApiError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(field(validate_password("Ab1!")), "password"); // too short
        assert_eq!(field(validate_password("test123!")), "password"); // no uppercase
        assert_eq!(field(validate_password("TEST123!")), "password"); // no lowercase
        assert_eq!(field(validate_password("Testtest")), "password"); // letters only
    }
}
