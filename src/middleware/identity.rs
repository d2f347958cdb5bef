use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller identity.
///
/// Authentication itself belongs to the gateway layer; by the time a
/// request reaches this service it carries a validated user id header.
/// Swapping in real JWT middleware replaces only this extractor — the
/// rest of the service keeps receiving a typed `UserId`.
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let id: i64 = raw.parse().map_err(|_| AppError::Unauthorized)?;
        if id <= 0 {
            return Err(AppError::Unauthorized);
        }

        Ok(AuthenticatedUser(UserId(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> Result<AuthenticatedUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(USER_ID_HEADER, v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_header_yields_typed_identity() {
        let AuthenticatedUser(user) = extract(Some("7")).await.unwrap();
        assert_eq!(user, UserId(7));
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn garbage_and_nonpositive_ids_are_unauthorized() {
        assert!(matches!(extract(Some("abc")).await, Err(AppError::Unauthorized)));
        assert!(matches!(extract(Some("0")).await, Err(AppError::Unauthorized)));
        assert!(matches!(extract(Some("-3")).await, Err(AppError::Unauthorized)));
    }
}
