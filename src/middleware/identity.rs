use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{error::AppError, models::UserId};

/// Header carrying the authenticated caller's id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller of a request
///
/// The id is trusted as-is; authentication happens before requests reach
/// this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing user identity".to_string()))?;

        raw.to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|id| CurrentUser(UserId(id)))
            .ok_or_else(|| AppError::Unauthorized("Malformed user identity".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_valid_user_id() {
        let user = extract(Some("123e4567-e89b-12d3-a456-426614174000"))
            .await
            .unwrap();
        assert_eq!(user.0.to_string(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
