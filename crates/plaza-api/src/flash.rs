use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

/// Explicit handler result for the redirect-and-message flows: where the
/// request goes next plus the one-shot message the presentation layer
/// renders. Carried to the next request in a short-lived cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
    pub redirect_to: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Notice,
    Alert,
}

impl FlashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashKind::Notice => "notice",
            FlashKind::Alert => "alert",
        }
    }
}

impl Flash {
    pub fn notice(redirect_to: &'static str, text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Notice,
            text: text.into(),
            redirect_to,
        }
    }

    pub fn alert(redirect_to: &'static str, text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Alert,
            text: text.into(),
            redirect_to,
        }
    }

    /// Cookie payload: `kind.base64url(text)`. Base64 keeps the Spanish
    /// message text cookie-safe without an extra escaping dependency.
    pub fn cookie_value(&self) -> String {
        format!("{}.{}", self.kind.as_str(), B64.encode(self.text.as_bytes()))
    }

    pub fn cookie(&self) -> String {
        format!("flash={}; Path=/; Max-Age=60", self.cookie_value())
    }
}

impl IntoResponse for Flash {
    fn into_response(self) -> Response {
        (
            StatusCode::SEE_OTHER,
            [
                (header::LOCATION, self.redirect_to.to_string()),
                (header::SET_COOKIE, self.cookie()),
            ],
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_encodes_kind_and_text() {
        let flash = Flash::alert("/participation/teams", "El equipo solicitado no existe");
        let value = flash.cookie_value();
        let (kind, encoded) = value.split_once('.').unwrap();
        assert_eq!(kind, "alert");

        let decoded = B64.decode(encoded).unwrap();
        assert_eq!(decoded, "El equipo solicitado no existe".as_bytes());
    }

    #[test]
    fn response_redirects_with_flash_cookie() {
        let resp = Flash::notice("/", "Datos actualizados correctamente").into_response();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
        let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("flash=notice."));
    }
}
