//! API handlers for Book Hive REST endpoints

pub mod admin;
pub mod catalog;
pub mod events;
pub mod functions;
pub mod health;
pub mod openapi;

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{activity::RequestMeta, admin::AdminClaims},
    AppState,
};

/// Extractor for an administrator session (bearer JWT, not revoked)
pub struct AuthenticatedAdmin(pub AdminClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Authentication("Missing or invalid authorization header".to_string()))?;

        let claims = state.services.auth.verify(bearer.token()).await?;
        Ok(AuthenticatedAdmin(claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let forwarded = header("x-forwarded-for")
            .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_string()));
        let ip_address = forwarded.or_else(|| header("x-real-ip")).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(RequestMeta {
            ip_address,
            user_agent: header(USER_AGENT.as_str()),
        })
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// List of items
    pub items: Vec<T>,
    /// Total number of items
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> Self {
        Self {
            items,
            total,
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 200),
        }
    }
}

/// The acting administrator: an explicit address when given, else the token subject
pub(crate) fn actor_name(claims: &AdminClaims, admin_email: Option<&str>) -> String {
    admin_email
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .unwrap_or(&claims.sub)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn meta_for(request: Request<()>) -> RequestMeta {
        let (mut parts, _) = request.into_parts();
        RequestMeta::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_request_meta_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap();

        let meta = meta_for(request).await;
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_request_meta_without_headers() {
        let meta = meta_for(Request::builder().body(()).unwrap()).await;
        assert!(meta.ip_address.is_none());
        assert!(meta.user_agent.is_none());
    }

    #[test]
    fn test_actor_name() {
        let claims = AdminClaims::new("admin", 1);
        assert_eq!(actor_name(&claims, None), "admin");
        assert_eq!(actor_name(&claims, Some("  ")), "admin");
        assert_eq!(actor_name(&claims, Some("lib@example.org")), "lib@example.org");
    }
}
