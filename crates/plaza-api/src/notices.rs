use axum::{Extension, Json, extract::Query, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use plaza_db::{Database, parse_timestamp, timestamp};
use plaza_types::api::{Claims, NoticeView, NoticesPage};

use crate::auth::AppState;
use crate::error::ApiError;

pub const PER_PAGE: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct NoticesQuery {
    pub page: Option<String>,
}

/// Visible notices, newest first, five per page.
pub async fn index(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<NoticesQuery>,
) -> Result<Json<NoticesPage>, ApiError> {
    let db = state.clone();
    let page = tokio::task::spawn_blocking(move || {
        load_page(&db.db, Utc::now(), query.page.as_deref())
    })
    .await??;

    Ok(Json(page))
}

/// Anything that is not a positive integer falls back to the first page:
/// absent, empty, non-numeric, zero, negative.
fn normalize_page(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

fn load_page(db: &Database, now: DateTime<Utc>, raw_page: Option<&str>) -> anyhow::Result<NoticesPage> {
    let page = normalize_page(raw_page);
    let (rows, total_pages) = db.visible_notices(&timestamp(now), page, PER_PAGE)?;

    let notices = rows
        .into_iter()
        .map(|n| NoticeView {
            id: n.id,
            title: n.title,
            body: n.body,
            link: n.link,
            created_at: parse_timestamp(&n.created_at),
        })
        .collect();

    Ok(NoticesPage {
        notices,
        page,
        per_page: PER_PAGE,
        total_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn page_normalization() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some("")), 1);
        assert_eq!(normalize_page(Some("abc")), 1);
        assert_eq!(normalize_page(Some("0")), 1);
        assert_eq!(normalize_page(Some("-3")), 1);
        assert_eq!(normalize_page(Some("1")), 1);
        assert_eq!(normalize_page(Some("2")), 2);
        assert_eq!(normalize_page(Some(" 4 ")), 4);
    }

    #[test]
    fn page_beyond_last_is_empty_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_notice("only", Some(&timestamp(now)), None, &timestamp(now)).unwrap();

        let page = load_page(&db, now, Some("999")).unwrap();
        assert!(page.notices.is_empty());
        assert_eq!(page.page, 999);
        assert_eq!(page.total_pages, 1);

        // u32::MAX straight off the query string.
        let page = load_page(&db, now, Some("4294967295")).unwrap();
        assert!(page.notices.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn listing_reflects_visibility_and_order() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let ts = timestamp(now);

        db.create_notice("older", Some(&ts), None, &timestamp(now - Duration::days(2)))
            .unwrap();
        db.create_notice("newer", Some(&ts), None, &timestamp(now - Duration::hours(1)))
            .unwrap();
        db.create_notice("unsent", None, None, &ts).unwrap();

        let page = load_page(&db, now, None).unwrap();
        let titles: Vec<_> = page.notices.iter().map(|n| n.title.as_deref()).collect();
        assert_eq!(titles, vec![Some("newer"), Some("older")]);
        assert_eq!(page.per_page, 5);
        assert_eq!(page.page, 1);
    }
}
