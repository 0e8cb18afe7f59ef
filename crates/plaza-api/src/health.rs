use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use tracing::warn;

use plaza_types::api::HealthReport;

use crate::auth::AppState;

const REDIS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Aggregate health of the service. JSON by default; any client that asks
/// for something else gets a fixed plain-text acknowledgment regardless of
/// the real state (a deliberate simplification, kept as-is).
pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());

    if !wants_json(accept) {
        return (StatusCode::OK, "OK\n").into_response();
    }

    let db = state.clone();
    let database = match tokio::task::spawn_blocking(move || db.db.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let redis = match state.redis_url.as_deref() {
        Some(url) => Some(check_redis(url).await),
        None => None,
    };

    let (code, report) = build_report(
        database,
        redis,
        &state.environment,
        &state.build_version,
        Utc::now(),
    );

    if report.status != "ok" {
        warn!(
            event = "health_degraded",
            database = %report.database,
            database_error = report.database_error.as_deref().unwrap_or(""),
            redis_error = report.redis_error.as_deref().unwrap_or(""),
        );
    }

    (code, Json(report)).into_response()
}

async fn check_redis(url: &str) -> Result<(), String> {
    let probe = async {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok::<_, redis::RedisError>(())
    };

    match tokio::time::timeout(REDIS_PROBE_TIMEOUT, probe).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("ping timed out".to_string()),
    }
}

/// Rails-style content negotiation: JSON is the default format, and only
/// an explicit non-JSON preference (a browser's text/html, say) selects
/// the plain-text path.
fn wants_json(accept: Option<&str>) -> bool {
    match accept {
        None => true,
        Some(a) => a.contains("json") || a.trim_start().starts_with("*/*"),
    }
}

/// The service is "ok" only when every configured check passes, otherwise
/// "degraded" -- never "failed", it stays partially available.
fn build_report(
    database: Result<(), String>,
    redis: Option<Result<(), String>>,
    environment: &str,
    build_version: &str,
    now: DateTime<Utc>,
) -> (StatusCode, HealthReport) {
    let mut degraded = false;

    let (database_status, database_error) = match database {
        Ok(()) => ("connected", None),
        Err(e) => {
            degraded = true;
            ("disconnected", Some(e))
        }
    };

    let (redis_status, redis_error) = match redis {
        None => (None, None),
        Some(Ok(())) => (Some("connected"), None),
        Some(Err(e)) => {
            degraded = true;
            (Some("disconnected"), Some(e))
        }
    };

    let status = if degraded { "degraded" } else { "ok" };
    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let report = HealthReport {
        status: status.to_string(),
        database: database_status.to_string(),
        database_error,
        redis: redis_status.map(str::to_string),
        redis_error,
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_version: build_version.to_string(),
        language_version: option_env!("PLAZA_RUSTC_VERSION").unwrap_or("unknown").to_string(),
        environment: environment.to_string(),
        timestamp: now,
    };

    (code, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_passing_is_ok_200() {
        let (code, report) = build_report(Ok(()), Some(Ok(())), "test", "abc123", Utc::now());
        assert_eq!(code, StatusCode::OK);
        assert_eq!(report.status, "ok");
        assert_eq!(report.database, "connected");
        assert_eq!(report.redis.as_deref(), Some("connected"));
        assert!(report.database_error.is_none());
        assert!(report.redis_error.is_none());
    }

    #[test]
    fn database_failure_degrades_with_detail() {
        let (code, report) = build_report(
            Err("connection refused".to_string()),
            None,
            "test",
            "abc123",
            Utc::now(),
        );
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.database, "disconnected");
        assert_eq!(report.database_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn redis_failure_alone_degrades() {
        let (code, report) = build_report(
            Ok(()),
            Some(Err("ping timed out".to_string())),
            "test",
            "abc123",
            Utc::now(),
        );
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.database, "connected");
        assert_eq!(report.redis.as_deref(), Some("disconnected"));
        assert_eq!(report.redis_error.as_deref(), Some("ping timed out"));
    }

    #[test]
    fn unconfigured_redis_is_omitted_from_the_body() {
        let (_, report) = build_report(Ok(()), None, "test", "abc123", Utc::now());
        let body = serde_json::to_value(&report).unwrap();
        assert!(body.get("redis").is_none());
        assert!(body.get("redis_error").is_none());
        assert!(body.get("timestamp").is_some());
        assert_eq!(body["environment"], "test");
        assert_eq!(body["build_version"], "abc123");
    }

    #[test]
    fn content_negotiation_defaults_to_json() {
        assert!(wants_json(None));
        assert!(wants_json(Some("application/json")));
        assert!(wants_json(Some("*/*")));
        assert!(!wants_json(Some("text/html,application/xhtml+xml")));
        assert!(!wants_json(Some("text/plain")));
    }
}
