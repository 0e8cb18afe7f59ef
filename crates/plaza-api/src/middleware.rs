use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use jsonwebtoken::{DecodingKey, Validation, decode};

use plaza_types::api::Claims;

use crate::auth::{AppState, SIGN_IN_PATH};

/// Resolve the current principal from the session cookie or a bearer
/// header. A missing or invalid session is not an error: the request is
/// redirected to the sign-in page.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = bearer_token(&req).or_else(|| session_cookie_token(&req));

    let Some(token) = token else {
        return Redirect::to(SIGN_IN_PATH).into_response();
    };

    let decoded = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    );

    match decoded {
        Ok(data) => {
            req.extensions_mut().insert(data.claims);
            next.run(req).await
        }
        Err(_) => Redirect::to(SIGN_IN_PATH).into_response(),
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn session_cookie_token(req: &Request) -> Option<String> {
    let cookies = req.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session").then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header_name: &str, value: &str) -> Request {
        Request::builder()
            .header(header_name, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let req = request_with("cookie", "flash=notice.x; session=tok123; theme=dark");
        assert_eq!(session_cookie_token(&req).as_deref(), Some("tok123"));
    }

    #[test]
    fn missing_session_cookie_is_none() {
        let req = request_with("cookie", "flash=notice.x");
        assert!(session_cookie_token(&req).is_none());
    }

    #[test]
    fn bearer_header_wins_over_nothing() {
        let req = request_with("authorization", "Bearer abc");
        assert_eq!(bearer_token(&req).as_deref(), Some("abc"));

        let req = request_with("authorization", "Basic abc");
        assert!(bearer_token(&req).is_none());
    }
}
