//! Request extraction and response shaping

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{errors::TrackerError, notice::Notice, session::Session};

use super::AppState;

/// Successful reply: the payload plus an optional notice
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl<T> Reply<T> {
    pub fn new(data: T) -> Self {
        Self { data, notice: None }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// A failed action, answered with a destructive notice
#[derive(Debug)]
pub struct ApiError {
    title: &'static str,
    error: TrackerError,
}

#[derive(Serialize)]
struct ErrorBody {
    notice: Notice,
}

impl ApiError {
    pub fn new(title: &'static str, error: TrackerError) -> Self {
        let title = match &error {
            TrackerError::AccessDenied => "Access denied",
            TrackerError::Unauthenticated => "Authentication required",
            _ => title,
        };
        Self { title, error }
    }

    /// `map_err` adapter tagging an error with the action that failed
    pub fn titled(title: &'static str) -> impl FnOnce(TrackerError) -> Self {
        move |error| Self::new(title, error)
    }

    pub fn status(&self) -> StatusCode {
        match self.error {
            TrackerError::Validation(_) => StatusCode::BAD_REQUEST,
            TrackerError::InvalidCredentials | TrackerError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            TrackerError::AccessDenied => StatusCode::FORBIDDEN,
            TrackerError::NotFound { .. } => StatusCode::NOT_FOUND,
            TrackerError::Conflict(_) | TrackerError::CannotDeleteSelf => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(error: TrackerError) -> Self {
        Self::new("Request failed", error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            notice: Notice::failure(self.title, self.error.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// JSON body; a malformed or incomplete body is answered with a notice
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

const INVALID_REQUEST: &str = "Invalid request";

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(INVALID_REQUEST, TrackerError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(INVALID_REQUEST, TrackerError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(INVALID_REQUEST, TrackerError::Validation(rejection.body_text()))
    }
}

/// The session behind the request's bearer token
pub struct CurrentSession(pub Arc<Session>);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(TrackerError::Unauthenticated)?;

        let session = state.sessions.resolve(token).await?;
        Ok(Self(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TrackerError::validation("x"), StatusCode::BAD_REQUEST),
            (TrackerError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (TrackerError::AccessDenied, StatusCode::FORBIDDEN),
            (
                TrackerError::not_found("voyage", Uuid::nil()),
                StatusCode::NOT_FOUND,
            ),
            (TrackerError::CannotDeleteSelf, StatusCode::CONFLICT),
            (
                TrackerError::Backend("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::new("Failed", error).status(), status);
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let request = axum::http::Request::builder()
            .method("POST")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{\"email\":"))
            .unwrap();

        let error = ApiJson::<serde_json::Value>::from_request(request, &())
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.title, INVALID_REQUEST);
    }

    #[test]
    fn test_access_denied_title() {
        let error = ApiError::new("Error fetching users", TrackerError::AccessDenied);
        assert_eq!(error.title, "Access denied");
    }
}
