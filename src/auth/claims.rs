use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo::Role;

/// JWT payload. Attached to the request by the auth guard for the lifetime
/// of that request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,    // user ID
    pub email: String,
    pub role: Role,
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
    pub iss: String,  // issuer
    pub aud: String,  // audience
}
