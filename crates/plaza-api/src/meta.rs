use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Request metadata carried into every security log line. Extracted from
/// headers so handlers receive it as a plain argument instead of reaching
/// into a request-scoped logger.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: String,
}

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
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        // Behind the proxy the client address arrives in X-Forwarded-For;
        // only the first (client) hop is of interest.
        let ip_address = header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"))
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = header("user-agent").unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn meta_for(req: Request<()>) -> RequestMeta {
        let (mut parts, _) = req.into_parts();
        RequestMeta::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn takes_first_forwarded_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header("user-agent", "Mozilla/5.0")
            .body(())
            .unwrap();

        let meta = meta_for(req).await;
        assert_eq!(meta.ip_address, "203.0.113.9");
        assert_eq!(meta.user_agent, "Mozilla/5.0");
    }

    #[tokio::test]
    async fn falls_back_to_real_ip_then_unknown() {
        let req = Request::builder()
            .header("x-real-ip", "198.51.100.4")
            .body(())
            .unwrap();
        assert_eq!(meta_for(req).await.ip_address, "198.51.100.4");

        let bare = Request::builder().body(()).unwrap();
        let meta = meta_for(bare).await;
        assert_eq!(meta.ip_address, "unknown");
        assert_eq!(meta.user_agent, "unknown");
    }
}
