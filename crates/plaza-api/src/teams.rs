use axum::response::IntoResponse;
use axum::{Extension, Form, Json, extract::State};
use chrono::{DateTime, Utc};
use tracing::error;

use plaza_db::models::{JoinOutcome, LeaveOutcome};
use plaza_db::{Database, timestamp};
use plaza_types::api::{Claims, TeamForm, TeamView, TeamsIndexResponse, UpdateUserForm};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::flash::Flash;
use crate::meta::RequestMeta;

pub const TEAMS_PATH: &str = "/participation/teams";

const MSG_TEAM_NOT_FOUND: &str = "El equipo solicitado no existe";
const MSG_ALREADY_MEMBER: &str = "Ya eres miembro de este equipo";
const MSG_NOT_MEMBER: &str = "No eres miembro de este equipo";
const MSG_GENERAL_JOIN_OK: &str = "Te damos la bienvenida a los Equipos de Acción Participativa. \
     En los próximos días nos pondremos en contacto contigo.";
const MSG_GENERAL_JOIN_FAIL: &str =
    "Error al registrar tu solicitud. Por favor, inténtalo de nuevo.";
const MSG_GENERAL_LEAVE_OK: &str = "Te has dado de baja de los Equipos de Acción Participativa";
const MSG_GENERAL_LEAVE_FAIL: &str =
    "Error al procesar tu solicitud. Por favor, inténtalo de nuevo.";
const MSG_PROFILE_OK: &str = "Datos actualizados correctamente";
const MSG_PROFILE_FAIL: &str = "Error al actualizar los datos";

/// Active teams plus the caller's membership flags. Inactive teams never
/// appear here, member or not, although they stay joinable by direct id --
/// observed behavior that is preserved rather than corrected.
pub async fn index(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<TeamsIndexResponse>, ApiError> {
    let db = state.clone();
    let user_id = claims.sub;

    let (teams, member_ids) = tokio::task::spawn_blocking(move || {
        let teams = db.db.list_active_teams()?;
        let member_ids = db.db.member_team_ids(user_id)?;
        Ok::<_, anyhow::Error>((teams, member_ids))
    })
    .await??;

    let teams = teams
        .into_iter()
        .map(|t| TeamView {
            member: member_ids.contains(&t.id),
            id: t.id,
            name: t.name,
            description: t.description,
        })
        .collect();

    Ok(Json(TeamsIndexResponse { teams }))
}

pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    meta: RequestMeta,
    Form(form): Form<TeamForm>,
) -> impl IntoResponse {
    let db = state.clone();
    let user_id = claims.sub;
    let result =
        tokio::task::spawn_blocking(move || join_flash(&db.db, user_id, form.team_id, Utc::now()))
            .await;

    match result {
        Ok(Ok(flash)) => flash,
        Ok(Err(e)) => {
            error!(
                event = "participation_join_error",
                user_id = claims.sub,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
                error = %e,
            );
            Flash::alert(TEAMS_PATH, MSG_GENERAL_JOIN_FAIL)
        }
        Err(e) => {
            error!(event = "participation_join_error", error = %e);
            Flash::alert(TEAMS_PATH, MSG_GENERAL_JOIN_FAIL)
        }
    }
}

pub async fn leave(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    meta: RequestMeta,
    Form(form): Form<TeamForm>,
) -> impl IntoResponse {
    let db = state.clone();
    let user_id = claims.sub;
    let result = tokio::task::spawn_blocking(move || leave_flash(&db.db, user_id, form.team_id))
        .await;

    match result {
        Ok(Ok(flash)) => flash,
        Ok(Err(e)) => {
            error!(
                event = "participation_leave_error",
                user_id = claims.sub,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
                error = %e,
            );
            Flash::alert(TEAMS_PATH, MSG_GENERAL_LEAVE_FAIL)
        }
        Err(e) => {
            error!(event = "participation_leave_error", error = %e);
            Flash::alert(TEAMS_PATH, MSG_GENERAL_LEAVE_FAIL)
        }
    }
}

/// Single-field profile update. The allow-list lives in the form type:
/// only `user[old_circle_data]` is deserialized, so injected attributes
/// never reach this handler, and a missing key is rejected by the form
/// extractor before it runs.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    meta: RequestMeta,
    Form(form): Form<UpdateUserForm>,
) -> impl IntoResponse {
    let db = state.clone();
    let user_id = claims.sub;
    let result = tokio::task::spawn_blocking(move || {
        db.db.update_old_circle_data(user_id, &form.old_circle_data)
    })
    .await;

    match result {
        Ok(Ok(true)) => Flash::notice(TEAMS_PATH, MSG_PROFILE_OK),
        Ok(Ok(false)) => Flash::alert(TEAMS_PATH, MSG_PROFILE_FAIL),
        Ok(Err(e)) => {
            error!(
                event = "participation_update_error",
                user_id = claims.sub,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
                error = %e,
            );
            Flash::alert(TEAMS_PATH, MSG_PROFILE_FAIL)
        }
        Err(e) => {
            error!(event = "participation_update_error", error = %e);
            Flash::alert(TEAMS_PATH, MSG_PROFILE_FAIL)
        }
    }
}

// -- Transition logic --

enum TeamParam {
    /// No usable team id: the request is the team-independent opt-in/out.
    General,
    /// A non-numeric id. Treated like an unknown team, never an error.
    Invalid,
    Id(i64),
}

fn parse_team_id(raw: Option<&str>) -> TeamParam {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => TeamParam::General,
        Some(s) => s
            .parse()
            .map(TeamParam::Id)
            .unwrap_or(TeamParam::Invalid),
    }
}

fn join_flash(
    db: &Database,
    user_id: i64,
    team_id: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<Flash> {
    let flash = match parse_team_id(team_id.as_deref()) {
        TeamParam::General => {
            if db.set_participation_opt_in(user_id, Some(&timestamp(now)))? {
                Flash::notice(TEAMS_PATH, MSG_GENERAL_JOIN_OK)
            } else {
                Flash::alert(TEAMS_PATH, MSG_GENERAL_JOIN_FAIL)
            }
        }
        TeamParam::Invalid => Flash::alert(TEAMS_PATH, MSG_TEAM_NOT_FOUND),
        TeamParam::Id(id) => match db.join_team(user_id, id)? {
            JoinOutcome::Joined(team) => {
                Flash::notice(TEAMS_PATH, format!("Te has unido al equipo {}", team.name))
            }
            JoinOutcome::AlreadyMember => Flash::alert(TEAMS_PATH, MSG_ALREADY_MEMBER),
            JoinOutcome::TeamNotFound => Flash::alert(TEAMS_PATH, MSG_TEAM_NOT_FOUND),
        },
    };
    Ok(flash)
}

fn leave_flash(db: &Database, user_id: i64, team_id: Option<String>) -> anyhow::Result<Flash> {
    let flash = match parse_team_id(team_id.as_deref()) {
        TeamParam::General => {
            if db.set_participation_opt_in(user_id, None)? {
                Flash::notice(TEAMS_PATH, MSG_GENERAL_LEAVE_OK)
            } else {
                Flash::alert(TEAMS_PATH, MSG_GENERAL_LEAVE_FAIL)
            }
        }
        TeamParam::Invalid => Flash::alert(TEAMS_PATH, MSG_TEAM_NOT_FOUND),
        TeamParam::Id(id) => match db.leave_team(user_id, id)? {
            LeaveOutcome::Left(team) => {
                Flash::notice(TEAMS_PATH, format!("Has abandonado el equipo {}", team.name))
            }
            LeaveOutcome::NotMember => Flash::alert(TEAMS_PATH, MSG_NOT_MEMBER),
            LeaveOutcome::TeamNotFound => Flash::alert(TEAMS_PATH, MSG_TEAM_NOT_FOUND),
        },
    };
    Ok(flash)
}
