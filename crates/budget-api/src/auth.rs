//! Acting-user extraction.
//!
//! Authentication happens in front of this service; the gateway forwards
//! the authenticated user id in the `x-user-id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::MissingActingUser;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = MissingActingUser;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| MissingActingUser(format!("{USER_ID_HEADER} header is required")))?;
        let raw = raw
            .to_str()
            .map_err(|_| MissingActingUser(format!("{USER_ID_HEADER} is not text")))?;
        Uuid::parse_str(raw.trim())
            .map(ActingUser)
            .map_err(|e| MissingActingUser(format!("{USER_ID_HEADER} is not a UUID: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(header: Option<&str>) -> Result<ActingUser, MissingActingUser> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        ActingUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header_is_extracted() {
        let id = Uuid::new_v4();

        let acting = extract(Some(&id.to_string())).await.unwrap();

        assert_eq!(acting, ActingUser(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_rejected() {
        assert!(extract(None).await.is_err());
        assert!(extract(Some("not-a-uuid")).await.is_err());
    }
}
