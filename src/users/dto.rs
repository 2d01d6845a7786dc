use serde::Deserialize;

use crate::users::repo::{Role, UserStatus};

/// Admin-created account; unlike public registration, any role is allowed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_accepts_status_and_role() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"role":"SELLER","status":"SUSPENDED","firstName":"Ada"}"#)
                .unwrap();
        assert_eq!(req.role, Some(Role::Seller));
        assert_eq!(req.status, Some(UserStatus::Suspended));
        assert_eq!(req.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }
}
