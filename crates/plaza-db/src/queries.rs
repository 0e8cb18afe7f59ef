use crate::Database;
use crate::models::{JoinOutcome, LeaveOutcome, NoticeRow, TeamRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, password) VALUES (?1, ?2)",
                (email, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Set or clear the team-independent participation opt-in timestamp.
    /// Returns false when no row was updated (the persistence-failure path
    /// surfaced to the caller as a generic alert).
    pub fn set_participation_opt_in(&self, user_id: i64, at: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET participation_team_at = ?1 WHERE id = ?2",
                (at, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    /// The single profile field writable through the participation flow.
    /// Anything else on the user row is out of reach of this statement by
    /// construction.
    pub fn update_old_circle_data(&self, user_id: i64, value: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET old_circle_data = ?1 WHERE id = ?2",
                (value, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Password reset --

    pub fn set_reset_token(&self, user_id: i64, digest: &str, sent_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_password_token = ?1, reset_password_sent_at = ?2
                 WHERE id = ?3",
                (digest, sent_at, user_id),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_reset_digest(&self, digest: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "reset_password_token = ?1", digest))
    }

    /// Store the new hash and clear every recovery-related column in one
    /// statement: the token, its timestamp, the lockout, and the legacy
    /// password flag.
    pub fn complete_password_reset(&self, user_id: i64, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1,
                        reset_password_token = NULL,
                        reset_password_sent_at = NULL,
                        locked_at = NULL,
                        has_legacy_password = 0
                 WHERE id = ?2",
                (password_hash, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Teams --

    pub fn create_team(&self, name: &str, description: Option<&str>, active: bool) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO participation_teams (name, description, active) VALUES (?1, ?2, ?3)",
                (name, description, active),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Teams shown on the listing. Inactive teams are excluded here even
    /// though they remain joinable by direct id (see join_team).
    pub fn list_active_teams(&self) -> Result<Vec<TeamRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, active, created_at
                 FROM participation_teams WHERE active = 1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], row_to_team)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_team(&self, id: i64) -> Result<Option<TeamRow>> {
        self.with_conn(|conn| query_team(conn, id))
    }

    pub fn member_team_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT team_id FROM participation_team_members WHERE user_id = ?1",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn membership_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM participation_team_members WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Membership join transition. The existence check and the insert run
    /// inside one transaction so concurrent joins from the same user cannot
    /// produce a duplicate pair.
    pub fn join_team(&self, user_id: i64, team_id: i64) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(team) = query_team(&tx, team_id)? else {
                return Ok(JoinOutcome::TeamNotFound);
            };
            let member: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM participation_team_members
                 WHERE team_id = ?1 AND user_id = ?2)",
                (team_id, user_id),
                |row| row.get(0),
            )?;
            if member {
                return Ok(JoinOutcome::AlreadyMember);
            }
            tx.execute(
                "INSERT INTO participation_team_members (team_id, user_id) VALUES (?1, ?2)",
                (team_id, user_id),
            )?;
            tx.commit()?;
            Ok(JoinOutcome::Joined(team))
        })
    }

    /// Membership leave transition, transactional for the same reason as
    /// join_team.
    pub fn leave_team(&self, user_id: i64, team_id: i64) -> Result<LeaveOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(team) = query_team(&tx, team_id)? else {
                return Ok(LeaveOutcome::TeamNotFound);
            };
            let removed = tx.execute(
                "DELETE FROM participation_team_members WHERE team_id = ?1 AND user_id = ?2",
                (team_id, user_id),
            )?;
            if removed == 0 {
                return Ok(LeaveOutcome::NotMember);
            }
            tx.commit()?;
            Ok(LeaveOutcome::Left(team))
        })
    }

    // -- Notices --

    pub fn create_notice(
        &self,
        title: &str,
        sent_at: Option<&str>,
        final_valid_at: Option<&str>,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notices (title, sent_at, final_valid_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (title, sent_at, final_valid_at, created_at),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Visible notices: sent and currently active, newest-created-first,
    /// paginated. Filtering, ordering and pagination all happen in SQL --
    /// the visibility predicate is never evaluated over an unbounded fetch.
    /// Returns the page rows plus the total page count. `page` must already
    /// be normalized to >= 1.
    pub fn visible_notices(
        &self,
        now: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<NoticeRow>, u32)> {
        const VISIBLE: &str =
            "sent_at IS NOT NULL AND (final_valid_at IS NULL OR final_valid_at > ?1)";

        self.with_conn(|conn| {
            let total: u32 = conn.query_row(
                &format!("SELECT COUNT(*) FROM notices WHERE {VISIBLE}"),
                [now],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT id, title, body, link, sent_at, final_valid_at, created_at
                 FROM notices WHERE {VISIBLE}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            // Widen before multiplying: `page` comes straight from the
            // query string and u32::MAX * per_page overflows.
            let offset = (page as u64 - 1) * per_page as u64;
            let rows = stmt
                .query_map(rusqlite::params![now, per_page, offset], row_to_notice)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total.div_ceil(per_page)))
        })
    }

    // -- Health --

    /// Trivial probe query used by the health endpoint.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    param: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, password, admin, old_circle_data, participation_team_at,
                has_legacy_password, locked_at, reset_password_token,
                reset_password_sent_at, created_at
         FROM users WHERE {predicate}"
    ))?;

    let row = stmt
        .query_row([param], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                admin: row.get(3)?,
                old_circle_data: row.get(4)?,
                participation_team_at: row.get(5)?,
                has_legacy_password: row.get(6)?,
                locked_at: row.get(7)?,
                reset_password_token: row.get(8)?,
                reset_password_sent_at: row.get(9)?,
                created_at: row.get(10)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_team(conn: &Connection, id: i64) -> Result<Option<TeamRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, active, created_at
         FROM participation_teams WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], row_to_team).optional()?;
    Ok(row)
}

fn row_to_team(row: &rusqlite::Row<'_>) -> std::result::Result<TeamRow, rusqlite::Error> {
    Ok(TeamRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_notice(row: &rusqlite::Row<'_>) -> std::result::Result<NoticeRow, rusqlite::Error> {
    Ok(NoticeRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        link: row.get(3)?,
        sent_at: row.get(4)?,
        final_valid_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
