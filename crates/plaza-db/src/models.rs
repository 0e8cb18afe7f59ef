/// Database row types — these map directly to SQLite rows.
/// Distinct from plaza-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub admin: bool,
    pub old_circle_data: Option<String>,
    pub participation_team_at: Option<String>,
    pub has_legacy_password: bool,
    pub locked_at: Option<String>,
    pub reset_password_token: Option<String>,
    pub reset_password_sent_at: Option<String>,
    pub created_at: String,
}

pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: String,
}

pub struct NoticeRow {
    pub id: i64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub sent_at: Option<String>,
    pub final_valid_at: Option<String>,
    pub created_at: String,
}

/// Result of a membership join transition.
pub enum JoinOutcome {
    Joined(TeamRow),
    AlreadyMember,
    TeamNotFound,
}

/// Result of a membership leave transition.
pub enum LeaveOutcome {
    Left(TeamRow),
    NotMember,
    TeamNotFound,
}
