use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str =
    "id, email, name, password, role, specialization, available, created_at";

pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub specialization: Option<&'a str>,
}

impl Database {
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password, role, specialization)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.name,
                    user.password_hash,
                    user.role,
                    user.specialization,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn list_users(&self, role: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NULL OR role = ?1)
                 ORDER BY created_at ASC, email ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([role], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_doctors(&self) -> Result<Vec<UserRow>> {
        self.list_users(Some("doctor"))
    }

    /// Returns false if the user does not exist.
    pub fn update_role(&self, id: &str, role: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2,
                    available = CASE WHEN ?2 = 'doctor' THEN available ELSE 0 END
                 WHERE id = ?1",
                (id, role),
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user; their habits, completions and other rows go with
    /// them by cascade. Returns the proof paths of their completions so the
    /// caller can remove the files, or `None` if there was no such user.
    pub fn delete_user(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let paths = {
                let mut stmt =
                    tx.prepare("SELECT proof_path FROM habit_completions WHERE user_id = ?1")?;
                let paths = stmt
                    .query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                paths
            };

            let changed = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;

            Ok((changed > 0).then_some(paths))
        })
    }

    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2 WHERE id = ?1",
                (id, password_hash),
            )?;
            Ok(())
        })
    }

    /// Only doctors carry an availability flag; returns false for anyone else.
    pub fn set_availability(&self, id: &str, available: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET available = ?2 WHERE id = ?1 AND role = 'doctor'",
                rusqlite::params![id, available],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn count_users_by_role(&self) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Password reset --

    /// Store the hash of a freshly issued reset token, replacing any older one.
    pub fn set_reset_token(&self, user_id: &str, token_hash: &str, ttl_minutes: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users
                 SET reset_token_hash = ?2,
                     reset_expires_at = datetime('now', '+' || ?3 || ' minutes')
                 WHERE id = ?1",
                rusqlite::params![user_id, token_hash, ttl_minutes],
            )?;
            Ok(())
        })
    }

    /// Swap the password for the user holding an unexpired token and clear
    /// the token so it cannot be replayed. Returns the user id on success.
    pub fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let user_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM users
                     WHERE reset_token_hash = ?1 AND reset_expires_at > datetime('now')",
                    [token_hash],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = &user_id {
                tx.execute(
                    "UPDATE users
                     SET password = ?2, reset_token_hash = NULL, reset_expires_at = NULL
                     WHERE id = ?1",
                    (id, new_password_hash),
                )?;
            }

            tx.commit()?;
            Ok(user_id)
        })
    }

    pub fn clear_expired_reset_tokens(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let cleared = conn.execute(
                "UPDATE users SET reset_token_hash = NULL, reset_expires_at = NULL
                 WHERE reset_expires_at IS NOT NULL AND reset_expires_at <= datetime('now')",
                [],
            )?;
            Ok(cleared)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        specialization: row.get(5)?,
        available: row.get(6)?,
        created_at: row.get(7)?,
    })
}
