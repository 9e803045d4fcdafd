use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::TrackerError,
    models::{
        AuthUser, ContactUpdate, Credentials, PasswordChange, PasswordReset, Principal,
        Registration, StatusFilter, SuccessfulTrip, UserSummary, Voyage, VoyageForm,
        VoyageStatus,
    },
    notice::Notice,
    session::Session,
};

use super::{
    extract::{ApiError, ApiJson, ApiPath, ApiQuery, CurrentSession, Reply},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub principal: Principal,
    pub display_name: String,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            principal: session.principal().clone(),
            display_name: session.display_name(),
            is_admin: session.is_admin(),
            expires_at: session.expires_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(flatten)]
    pub session: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VoyageQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: VoyageStatus,
}

#[derive(Debug, Deserialize)]
pub struct AdminToggle {
    pub admin: bool,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "notice": Notice::failure("Page not found", "Oops! Page not found"),
        })),
    )
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Reply<LoginResponse>, ApiError> {
    let session = state
        .sessions
        .login(&credentials)
        .await
        .map_err(ApiError::titled("Login failed"))?;

    Ok(Reply::new(LoginResponse {
        access_token: session.token().to_string(),
        session: SessionView::from(session.as_ref()),
    })
    .with_notice(Notice::success("Login successful", "Welcome back!")))
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<(StatusCode, Reply<AuthUser>), ApiError> {
    let user = state
        .sessions
        .register(&registration)
        .await
        .map_err(ApiError::titled("Registration failed"))?;

    Ok((
        StatusCode::CREATED,
        Reply::new(user).with_notice(Notice::success(
            "Registration successful",
            "Your account has been created. You can now log in.",
        )),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Reply<()>, ApiError> {
    state
        .sessions
        .logout(session.token())
        .await
        .map_err(ApiError::titled("Logout failed"))?;

    Ok(Reply::new(()).with_notice(Notice::success(
        "Logged out",
        "You have been successfully logged out",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResetRequest>,
) -> Result<Reply<()>, ApiError> {
    state
        .sessions
        .request_password_reset(&request.email)
        .await
        .map_err(ApiError::titled("Error"))?;

    Ok(Reply::new(()).with_notice(Notice::success(
        "Success",
        "If an account exists with this email, you will receive password reset instructions.",
    )))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ApiJson(reset): ApiJson<PasswordReset>,
) -> Result<Reply<()>, ApiError> {
    state
        .sessions
        .complete_password_reset(&reset)
        .await
        .map_err(ApiError::titled("Password reset failed"))?;

    Ok(Reply::new(()).with_notice(Notice::success(
        "Password updated",
        "Your password has been reset. You can now log in.",
    )))
}

pub async fn current_session(CurrentSession(session): CurrentSession) -> Reply<SessionView> {
    Reply::new(SessionView::from(session.as_ref()))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiJson(change): ApiJson<PasswordChange>,
) -> Result<Reply<()>, ApiError> {
    state
        .sessions
        .change_password(&session, &change)
        .await
        .map_err(ApiError::titled("Password update failed"))?;

    Ok(Reply::new(()).with_notice(Notice::success(
        "Password updated",
        "Your password has been successfully updated.",
    )))
}

pub async fn update_contact(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiJson(update): ApiJson<ContactUpdate>,
) -> Result<Reply<SessionView>, ApiError> {
    let refreshed = state
        .sessions
        .update_contact(&session, &update)
        .await
        .map_err(ApiError::titled("Update failed"))?;

    Ok(
        Reply::new(SessionView::from(refreshed.as_ref())).with_notice(Notice::success(
            "Contact information updated",
            "Your contact information has been successfully updated.",
        )),
    )
}

pub async fn list_voyages(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    ApiQuery(query): ApiQuery<VoyageQuery>,
) -> Result<Reply<Vec<Voyage>>, ApiError> {
    let filter = StatusFilter::parse(query.status.as_deref());
    let voyages = state
        .voyages
        .list_filtered(&filter)
        .await
        .map_err(ApiError::titled("Error fetching vessels"))?;

    Ok(Reply::new(voyages))
}

pub async fn create_voyage(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiJson(form): ApiJson<VoyageForm>,
) -> Result<(StatusCode, Reply<Voyage>), ApiError> {
    let voyage = state
        .voyages
        .create(&session, form)
        .await
        .map_err(|e| match e {
            TrackerError::Validation(_) => ApiError::new("Missing information", e),
            e => ApiError::new("Failed to add vessel", e),
        })?;

    let notice = Notice::success(
        "Vessel added",
        format!("{} has been added to the tracking system", voyage.name),
    );
    Ok((StatusCode::CREATED, Reply::new(voyage).with_notice(notice)))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Reply<Voyage>, ApiError> {
    let voyage = state
        .voyages
        .update_status(id, update.status)
        .await
        .map_err(ApiError::titled("Failed to update status"))?;

    Ok(Reply::new(voyage).with_notice(Notice::success(
        "Status updated",
        "Vessel status has been updated successfully",
    )))
}

pub async fn mark_successful(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Reply<SuccessfulTrip>, ApiError> {
    let trip = state
        .voyages
        .mark_successful(&session, id)
        .await
        .map_err(ApiError::titled("Failed to mark as successful"))?;

    Ok(Reply::new(trip).with_notice(Notice::success(
        "Trip completed",
        "Vessel has been marked as successfully completed",
    )))
}

pub async fn successful_trips(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
) -> Result<Reply<Vec<SuccessfulTrip>>, ApiError> {
    let trips = state
        .voyages
        .successful_trips()
        .await
        .map_err(ApiError::titled("Error fetching data"))?;

    Ok(Reply::new(trips.as_ref().clone()))
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Reply<Vec<UserSummary>>, ApiError> {
    let users = state
        .admin
        .list_users(&session)
        .await
        .map_err(ApiError::titled("Error fetching users"))?;

    Ok(Reply::new(users.as_ref().clone()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Reply<()>, ApiError> {
    state
        .admin
        .delete_user(&session, id)
        .await
        .map_err(ApiError::titled("Failed to delete user"))?;

    Ok(Reply::new(()).with_notice(Notice::success(
        "User deleted",
        "The user has been removed from the system",
    )))
}

pub async fn toggle_admin(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(toggle): ApiJson<AdminToggle>,
) -> Result<Reply<()>, ApiError> {
    state
        .admin
        .set_admin(&session, id, toggle.admin)
        .await
        .map_err(ApiError::titled("Failed to update admin status"))?;

    let notice = if toggle.admin {
        Notice::success("Admin added", "The user has been given admin privileges")
    } else {
        Notice::success(
            "Admin removed",
            "Admin privileges have been revoked from the user",
        )
    };
    Ok(Reply::new(()).with_notice(notice))
}
