use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            email                   TEXT NOT NULL UNIQUE,
            password                TEXT NOT NULL,
            admin                   INTEGER NOT NULL DEFAULT 0,
            old_circle_data         TEXT,
            participation_team_at   TEXT,
            has_legacy_password     INTEGER NOT NULL DEFAULT 0,
            locked_at               TEXT,
            reset_password_token    TEXT UNIQUE,
            reset_password_sent_at  TEXT,
            created_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS participation_teams (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            description TEXT,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Row existence is membership; a (team, user) pair appears at most once.
        CREATE TABLE IF NOT EXISTS participation_team_members (
            team_id     INTEGER NOT NULL REFERENCES participation_teams(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(team_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_team_members_user
            ON participation_team_members(user_id);

        CREATE TABLE IF NOT EXISTS notices (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            title           TEXT,
            body            TEXT,
            link            TEXT,
            sent_at         TEXT,
            final_valid_at  TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notices_created
            ON notices(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
