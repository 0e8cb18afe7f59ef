use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json, extract::State};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use plaza_db::Database;
use plaza_types::api::{Claims, FormErrors, SignInForm};

use crate::flash::Flash;
use crate::meta::RequestMeta;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub environment: String,
    pub build_version: String,
}

pub const SIGN_IN_PATH: &str = "/users/sign_in";
pub const ROOT_PATH: &str = "/";

const MSG_SIGNED_IN: &str = "Has iniciado sesión correctamente";
const MSG_SIGNED_OUT: &str = "Has cerrado la sesión";
const MSG_BAD_CREDENTIALS: &str = "Correo electrónico o contraseña no válidos";

pub async fn sign_in_page() -> StatusCode {
    StatusCode::OK
}

pub async fn sign_in(
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<SignInForm>,
) -> Response {
    let SignInForm { email, password } = form;
    let db = state.clone();
    let lookup = email.clone();
    let verified = tokio::task::spawn_blocking(move || {
        let Some(user) = db.db.get_user_by_email(&lookup)? else {
            return Ok(None);
        };
        Ok::<_, anyhow::Error>(verify_password(&user.password, &password).then_some(user))
    })
    .await;

    match verified {
        Ok(Ok(Some(user))) => {
            info!(
                event = "login_succeeded",
                user_id = user.id,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
            match create_session_token(&state.jwt_secret, user.id, &user.email) {
                Ok(token) => with_session_cookie(Flash::notice(ROOT_PATH, MSG_SIGNED_IN), &token),
                Err(e) => {
                    error!(event = "session_token_error", error = %e);
                    Flash::alert(SIGN_IN_PATH, MSG_BAD_CREDENTIALS).into_response()
                }
            }
        }
        Ok(Ok(None)) => {
            info!(
                event = "login_failed",
                email = %email,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
            // Same answer for unknown email and wrong password.
            bad_credentials_response()
        }
        Ok(Err(e)) => {
            error!(
                event = "login_error",
                error = %e,
                ip_address = %meta.ip_address,
                user_agent = %meta.user_agent,
            );
            bad_credentials_response()
        }
        Err(e) => {
            // Internal failures re-render the form too; nothing about the
            // underlying error reaches the client.
            error!(event = "login_error", error = %e);
            bad_credentials_response()
        }
    }
}

/// The sign-in form re-rendered with the generic credential error. Used
/// for bad credentials and for internal failures alike.
fn bad_credentials_response() -> Response {
    (
        StatusCode::OK,
        Json(FormErrors {
            errors: vec![MSG_BAD_CREDENTIALS.to_string()],
        }),
    )
        .into_response()
}

pub async fn sign_out() -> Response {
    let mut resp = Flash::notice(SIGN_IN_PATH, MSG_SIGNED_OUT).into_response();
    if let Ok(value) = clear_session_cookie().parse() {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

// -- Session plumbing --

pub fn create_session_token(secret: &str, user_id: i64, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn session_cookie(token: &str) -> String {
    format!("session={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn clear_session_cookie() -> String {
    "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0".to_string()
}

/// Attach the signed-in session cookie to a flash redirect.
pub fn with_session_cookie(flash: Flash, token: &str) -> Response {
    let mut resp = flash.into_response();
    if let Ok(value) = session_cookie(token).parse() {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

// -- Password hashing --

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
