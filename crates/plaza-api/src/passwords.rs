use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json, extract::Query, extract::State};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use plaza_db::models::UserRow;
use plaza_db::{Database, parse_timestamp, timestamp};
use plaza_types::api::{FormErrors, ResetRequestForm, ResetUpdateForm};

use crate::auth::{self, AppState, ROOT_PATH, SIGN_IN_PATH};
use crate::flash::Flash;
use crate::meta::RequestMeta;

/// Devise's default recovery window.
const RESET_TOKEN_TTL_HOURS: i64 = 6;
const MIN_PASSWORD_LEN: usize = 8;

const MSG_RESET_SENT: &str = "Si tu correo electrónico existe en nuestra base de datos, en unos \
     minutos recibirás un correo con las instrucciones para restablecer tu contraseña.";
const MSG_RESET_DONE: &str =
    "Tu contraseña ha sido cambiada correctamente. Has iniciado sesión.";
const MSG_RESET_ERROR: &str =
    "Ha ocurrido un error al procesar tu solicitud. Por favor, inténtalo de nuevo.";

const ERR_TOKEN_BLANK: &str = "El token de recuperación no puede estar en blanco";
const ERR_TOKEN_INVALID: &str = "El token de recuperación no es válido";
const ERR_TOKEN_EXPIRED: &str =
    "El token de recuperación ha caducado, por favor solicita uno nuevo";
const ERR_PASSWORD_BLANK: &str = "La contraseña no puede estar en blanco";
const ERR_PASSWORD_SHORT: &str = "La contraseña es demasiado corta (mínimo 8 caracteres)";
const ERR_CONFIRMATION_MISMATCH: &str = "La confirmación de la contraseña no coincide";

pub async fn new_page() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct EditQuery {
    #[allow(dead_code)]
    pub reset_password_token: Option<String>,
}

/// The edit form renders for any token; validity is only judged on submit.
pub async fn edit_page(Query(_query): Query<EditQuery>) -> StatusCode {
    StatusCode::OK
}

/// Request a reset token. The response is identical whether or not the
/// account exists, so the endpoint cannot be used to enumerate users.
pub async fn create(
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<ResetRequestForm>,
) -> Flash {
    info!(
        event = "password_reset_requested",
        controller = "passwords",
        email = %form.email,
        ip_address = %meta.ip_address,
        user_agent = %meta.user_agent,
    );

    let db = state.clone();
    let email = form.email.clone();
    let issued = tokio::task::spawn_blocking(move || {
        let Some(user) = db.db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let token = generate_token();
        db.db
            .set_reset_token(user.id, &token_digest(&token), &timestamp(Utc::now()))?;
        Ok::<_, anyhow::Error>(Some((user.id, token)))
    })
    .await;

    match issued {
        Ok(Ok(Some((user_id, _token)))) => {
            // Mail delivery is an external collaborator; this event is the
            // handoff point.
            info!(
                event = "reset_instructions_sent",
                user_id,
                email = %form.email,
            );
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => {
            error!(
                event = "password_reset_error",
                error = %e,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
        }
        Err(e) => {
            error!(event = "password_reset_error", error = %e);
        }
    }

    Flash::notice(SIGN_IN_PATH, MSG_RESET_SENT)
}

/// Submit a new password against a previously issued token.
pub async fn update(
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<ResetUpdateForm>,
) -> Response {
    let token_present = !form.reset_password_token.trim().is_empty();

    let db = state.clone();
    let result =
        tokio::task::spawn_blocking(move || apply_reset(&db.db, &form, Utc::now())).await;

    match result {
        Ok(Ok(ResetOutcome::Success {
            user,
            legacy_cleared,
        })) => {
            if legacy_cleared {
                info!(event = "legacy_password_cleared", user_id = user.id);
            }
            info!(
                event = "password_reset_success",
                user_id = user.id,
                email = %user.email,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );

            match auth::create_session_token(&state.jwt_secret, user.id, &user.email) {
                Ok(token) => {
                    auth::with_session_cookie(Flash::notice(ROOT_PATH, MSG_RESET_DONE), &token)
                }
                Err(e) => {
                    error!(event = "session_token_error", error = %e);
                    Flash::notice(SIGN_IN_PATH, MSG_RESET_DONE).into_response()
                }
            }
        }
        Ok(Ok(ResetOutcome::Invalid(errors))) => {
            info!(
                event = "password_reset_failed",
                token_present,
                errors = ?errors,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
            // Re-render the edit form with field errors.
            (StatusCode::OK, Json(FormErrors { errors })).into_response()
        }
        Ok(Err(e)) => {
            error!(
                event = "password_reset_error",
                error = %e,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
            // Nothing of the underlying failure reaches the user.
            Flash::alert(SIGN_IN_PATH, MSG_RESET_ERROR).into_response()
        }
        Err(e) => {
            error!(event = "password_reset_error", error = %e);
            Flash::alert(SIGN_IN_PATH, MSG_RESET_ERROR).into_response()
        }
    }
}

// -- Reset mechanics --

enum ResetOutcome {
    Success { user: UserRow, legacy_cleared: bool },
    Invalid(Vec<String>),
}

fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Only the sha256 digest of a token is stored; a leaked users table does
/// not yield usable reset links.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn validate_new_password(password: &str, confirmation: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.is_empty() {
        errors.push(ERR_PASSWORD_BLANK.to_string());
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(ERR_PASSWORD_SHORT.to_string());
    }
    if password != confirmation {
        errors.push(ERR_CONFIRMATION_MISMATCH.to_string());
    }
    errors
}

fn token_expired(user: &UserRow, now: DateTime<Utc>) -> bool {
    match user.reset_password_sent_at.as_deref() {
        Some(sent_at) => parse_timestamp(sent_at) + Duration::hours(RESET_TOKEN_TTL_HOURS) < now,
        None => true,
    }
}

fn apply_reset(
    db: &Database,
    form: &ResetUpdateForm,
    now: DateTime<Utc>,
) -> anyhow::Result<ResetOutcome> {
    let token = form.reset_password_token.trim();
    if token.is_empty() {
        return Ok(ResetOutcome::Invalid(vec![ERR_TOKEN_BLANK.to_string()]));
    }

    let Some(user) = db.get_user_by_reset_digest(&token_digest(token))? else {
        return Ok(ResetOutcome::Invalid(vec![ERR_TOKEN_INVALID.to_string()]));
    };

    if token_expired(&user, now) {
        return Ok(ResetOutcome::Invalid(vec![ERR_TOKEN_EXPIRED.to_string()]));
    }

    let errors = validate_new_password(&form.password, &form.password_confirmation);
    if !errors.is_empty() {
        return Ok(ResetOutcome::Invalid(errors));
    }

    let hash = auth::hash_password(&form.password)?;
    if !db.complete_password_reset(user.id, &hash)? {
        anyhow::bail!("password reset wrote no rows for user {}", user.id);
    }

    Ok(ResetOutcome::Success {
        legacy_cleared: user.has_legacy_password,
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(token: &str, password: &str, confirmation: &str) -> ResetUpdateForm {
        ResetUpdateForm {
            reset_password_token: token.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
        }
    }

    fn user_with_token(db: &Database, legacy: bool, sent_at: DateTime<Utc>) -> (i64, String) {
        let uid = db.create_user("maria@example.com", "old-hash").unwrap();
        if legacy {
            db.with_conn(|conn| {
                conn.execute("UPDATE users SET has_legacy_password = 1 WHERE id = ?1", [uid])?;
                Ok(())
            })
            .unwrap();
        }
        let token = generate_token();
        db.set_reset_token(uid, &token_digest(&token), &timestamp(sent_at)).unwrap();
        (uid, token)
    }

    #[test]
    fn password_validation_rules() {
        assert!(validate_new_password("NewPassword123!", "NewPassword123!").is_empty());
        assert_eq!(
            validate_new_password("", ""),
            vec![ERR_PASSWORD_BLANK.to_string()]
        );
        assert_eq!(
            validate_new_password("short", "short"),
            vec![ERR_PASSWORD_SHORT.to_string()]
        );
        assert_eq!(
            validate_new_password("NewPassword123!", "Different123!"),
            vec![ERR_CONFIRMATION_MISMATCH.to_string()]
        );
    }

    #[test]
    fn reset_succeeds_and_clears_legacy_flag() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let (uid, token) = user_with_token(&db, true, now);

        let outcome =
            apply_reset(&db, &form(&token, "NewPassword123!", "NewPassword123!"), now).unwrap();
        match outcome {
            ResetOutcome::Success {
                user,
                legacy_cleared,
            } => {
                assert_eq!(user.id, uid);
                assert!(legacy_cleared);
            }
            ResetOutcome::Invalid(errors) => panic!("unexpected errors: {errors:?}"),
        }

        let row = db.get_user_by_id(uid).unwrap().unwrap();
        assert!(!row.has_legacy_password);
        assert!(row.reset_password_token.is_none());
        assert!(auth::verify_password(&row.password, "NewPassword123!"));
        assert!(!auth::verify_password(&row.password, "OldPassword123!"));
    }

    #[test]
    fn reset_without_legacy_flag_reports_nothing_to_clear() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let (_, token) = user_with_token(&db, false, now);

        match apply_reset(&db, &form(&token, "NewPassword123!", "NewPassword123!"), now).unwrap() {
            ResetOutcome::Success { legacy_cleared, .. } => assert!(!legacy_cleared),
            ResetOutcome::Invalid(errors) => panic!("unexpected errors: {errors:?}"),
        }
    }

    #[test]
    fn invalid_submissions_do_not_change_the_password() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let (uid, token) = user_with_token(&db, true, now);

        let cases = [
            (form("", "NewPassword123!", "NewPassword123!"), ERR_TOKEN_BLANK),
            (form("wrong-token", "NewPassword123!", "NewPassword123!"), ERR_TOKEN_INVALID),
            (form(&token, "short", "short"), ERR_PASSWORD_SHORT),
            (form(&token, "NewPassword123!", "Different123!"), ERR_CONFIRMATION_MISMATCH),
            (form(&token, "", ""), ERR_PASSWORD_BLANK),
        ];

        for (f, expected) in cases {
            match apply_reset(&db, &f, now).unwrap() {
                ResetOutcome::Invalid(errors) => assert!(
                    errors.iter().any(|e| e == expected),
                    "expected {expected:?} in {errors:?}"
                ),
                ResetOutcome::Success { .. } => panic!("reset should not succeed"),
            }
        }

        let row = db.get_user_by_id(uid).unwrap().unwrap();
        assert_eq!(row.password, "old-hash");
        assert!(row.has_legacy_password);
    }

    #[test]
    fn expired_token_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let (_, token) =
            user_with_token(&db, false, now - Duration::hours(RESET_TOKEN_TTL_HOURS + 1));

        match apply_reset(&db, &form(&token, "NewPassword123!", "NewPassword123!"), now).unwrap() {
            ResetOutcome::Invalid(errors) => {
                assert_eq!(errors, vec![ERR_TOKEN_EXPIRED.to_string()])
            }
            ResetOutcome::Success { .. } => panic!("expired token should not reset"),
        }
    }

    #[test]
    fn token_digest_is_stable_and_opaque() {
        let token = "abc123";
        assert_eq!(token_digest(token), token_digest(token));
        assert_ne!(token_digest(token), token);
        assert_eq!(token_digest(token).len(), 64);
    }
}
