use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Session claims shared between the sign-in handler (encoding) and the
/// auth middleware (decoding). Canonical definition lives here in
/// plaza-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Sessions --

/// Browser form bodies arrive Rails-style with bracketed names
/// (`user[email]`), hence the renames on every form struct below.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    #[serde(rename = "user[email]")]
    pub email: String,
    #[serde(rename = "user[password]")]
    pub password: String,
}

// -- Teams --

#[derive(Debug, Deserialize)]
pub struct TeamForm {
    pub team_id: Option<String>,
}

/// Profile update form. Only `old_circle_data` is mapped; any other
/// injected `user[...]` field is dropped during deserialization, which is
/// what enforces the single-field allow-list. A body without the
/// `user[old_circle_data]` key is rejected by the form extractor before
/// the handler runs.
#[derive(Debug, Deserialize)]
pub struct UpdateUserForm {
    #[serde(rename = "user[old_circle_data]")]
    pub old_circle_data: String,
}

#[derive(Debug, Serialize)]
pub struct TeamView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub member: bool,
}

#[derive(Debug, Serialize)]
pub struct TeamsIndexResponse {
    pub teams: Vec<TeamView>,
}

// -- Notices --

#[derive(Debug, Serialize)]
pub struct NoticeView {
    pub id: i64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct NoticesPage {
    pub notices: Vec<NoticeView>,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

// -- Passwords --

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    #[serde(rename = "user[email]")]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetUpdateForm {
    #[serde(rename = "user[reset_password_token]", default)]
    pub reset_password_token: String,
    #[serde(rename = "user[password]", default)]
    pub password: String,
    #[serde(rename = "user[password_confirmation]", default)]
    pub password_confirmation: String,
}

/// Field errors rendered back into the form the request came from.
#[derive(Debug, Serialize)]
pub struct FormErrors {
    pub errors: Vec<String>,
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_error: Option<String>,
    pub version: String,
    pub build_version: String,
    pub language_version: String,
    pub environment: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
