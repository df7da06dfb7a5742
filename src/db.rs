use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::models::LoginResponse;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS session (
  id           INTEGER PRIMARY KEY CHECK (id = 1),
  user_id      INTEGER NOT NULL,
  username     TEXT NOT NULL,
  role         TEXT NOT NULL,
  access_token TEXT NOT NULL,
  token_type   TEXT NOT NULL DEFAULT 'bearer',
  logged_in_at TEXT NOT NULL -- RFC3339
);
"#;

/// Role that records counters but does not run balances or reports.
pub const OPERATOR_ROLE: &str = "operador";

/// The signed-in user, as cached between invocations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSession {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub token_type: String,
    pub logged_in_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn is_operator(&self) -> bool {
        self.role.trim().eq_ignore_ascii_case(OPERATOR_ROLE)
    }
}

/// Connect to SQLite (with WAL mode)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Replace whatever session was stored.
pub fn save_session(conn: &Connection, login: &LoginResponse) -> Result<StoredSession> {
    let session = StoredSession {
        user_id: login.id,
        username: login.username.clone(),
        role: login.role.clone(),
        access_token: login.access_token.clone(),
        token_type: login.token_type.clone(),
        logged_in_at: Utc::now(),
    };

    conn.execute(
        r#"
        INSERT INTO session (id, user_id, username, role, access_token, token_type, logged_in_at)
        VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            user_id      = excluded.user_id,
            username     = excluded.username,
            role         = excluded.role,
            access_token = excluded.access_token,
            token_type   = excluded.token_type,
            logged_in_at = excluded.logged_in_at
        "#,
        params![
            session.user_id,
            session.username,
            session.role,
            session.access_token,
            session.token_type,
            session.logged_in_at.to_rfc3339()
        ],
    )?;
    Ok(session)
}

pub fn load_session(conn: &Connection) -> Result<Option<StoredSession>> {
    let session = conn
        .query_row(
            "SELECT user_id, username, role, access_token, token_type, logged_in_at
             FROM session WHERE id = 1",
            [],
            |r| {
                let raw: String = r.get(5)?;
                let logged_in_at = DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        warn!("Stored session has unreadable login time {:?}: {}", raw, e);
                        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                    })?;

                Ok(StoredSession {
                    user_id: r.get(0)?,
                    username: r.get(1)?,
                    role: r.get(2)?,
                    access_token: r.get(3)?,
                    token_type: r.get(4)?,
                    logged_in_at,
                })
            },
        )
        .optional()?;
    Ok(session)
}

/// Forget the stored session. Returns whether one existed.
pub fn clear_session(conn: &Connection) -> Result<bool> {
    let removed = conn.execute("DELETE FROM session", [])?;
    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsoleError;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn login(username: &str, role: &str) -> LoginResponse {
        LoginResponse {
            id: 7,
            username: username.into(),
            role: role.into(),
            access_token: format!("token-{username}"),
            token_type: "bearer".into(),
        }
    }

    #[test]
    fn empty_store_has_no_session() {
        let conn = memory();
        assert!(load_session(&conn).unwrap().is_none());
        assert!(!clear_session(&conn).unwrap());
    }

    #[test]
    fn login_replaces_previous_session() {
        let conn = memory();
        save_session(&conn, &login("ana", "admin")).unwrap();
        save_session(&conn, &login("luis", "Operador")).unwrap();

        let s = load_session(&conn).unwrap().unwrap();
        assert_eq!(s.username, "luis");
        assert_eq!(s.access_token, "token-luis");
        assert!(s.is_operator());

        assert!(clear_session(&conn).unwrap());
        assert!(load_session(&conn).unwrap().is_none());
    }

    #[test]
    fn corrupt_login_time_is_an_error() {
        let conn = memory();
        save_session(&conn, &login("ana", "admin")).unwrap();
        conn.execute("UPDATE session SET logged_in_at = 'yesterday'", [])
            .unwrap();

        let err = load_session(&conn).unwrap_err();
        assert!(matches!(
            err,
            ConsoleError::Storage(rusqlite::Error::FromSqlConversionFailure(5, Type::Text, _))
        ));

        // logging in again repairs the cache
        save_session(&conn, &login("ana", "admin")).unwrap();
        assert!(load_session(&conn).unwrap().is_some());
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = memory();
        run_migrations(&conn).unwrap();
        save_session(&conn, &login("ana", "admin")).unwrap();
        run_migrations(&conn).unwrap();
        assert!(load_session(&conn).unwrap().is_some());
    }
}
