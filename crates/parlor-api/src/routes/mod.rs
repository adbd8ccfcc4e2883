pub mod health;
pub mod images;
pub mod messages;
pub mod threads;

use axum::http::HeaderMap;

use parlor_chat::TurnUser;

use crate::error::ApiError;

/// Session resolution happens upstream; the service trusts the identity
/// headers set by the authenticating proxy.
pub fn current_user(headers: &HeaderMap) -> Result<TurnUser, ApiError> {
    let id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let name = headers
        .get("x-user-name")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("user");

    Ok(TurnUser {
        id: id.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_comes_from_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("u-1"));
        headers.insert("x-user-name", HeaderValue::from_static("Alice"));

        let user = current_user(&headers).unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn missing_user_id_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            current_user(&headers),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn name_defaults_when_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("u-1"));

        let user = current_user(&headers).unwrap();
        assert_eq!(user.name, "user");
    }
}
