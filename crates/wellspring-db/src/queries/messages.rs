use anyhow::Result;
use rusqlite::{OptionalExtension, Row};

use crate::Database;
use crate::models::{MessageRow, NewMessage, PageCursor};

// JOIN users to fetch both display names in a single query
const MESSAGE_SELECT: &str = "SELECT m.id, m.thread_id, m.sender_id, s.name, m.recipient_id, r.name,
        m.subject, m.body, m.read_flag, m.created_at
     FROM messages m
     LEFT JOIN users s ON s.id = m.sender_id
     LEFT JOIN users r ON r.id = m.recipient_id";

impl Database {
    pub fn insert_message(&self, message: &NewMessage) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, thread_id, sender_id, recipient_id, subject, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id,
                    message.thread_id,
                    message.sender_id,
                    message.recipient_id,
                    message.subject,
                    message.body,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let row = conn.query_row(&sql, [id], map_message).optional()?;
            Ok(row)
        })
    }

    /// Received messages, newest first.
    pub fn inbox(
        &self,
        user_id: &str,
        limit: u32,
        before: Option<&PageCursor>,
    ) -> Result<Vec<MessageRow>> {
        self.list_messages_by("m.recipient_id", user_id, limit, before)
    }

    /// Sent messages, newest first.
    pub fn sent_messages(
        &self,
        user_id: &str,
        limit: u32,
        before: Option<&PageCursor>,
    ) -> Result<Vec<MessageRow>> {
        self.list_messages_by("m.sender_id", user_id, limit, before)
    }

    /// Oldest first, so the conversation reads top to bottom.
    pub fn thread(&self, thread_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.thread_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([thread_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Only the recipient can mark a message read. Returns false otherwise.
    pub fn mark_read(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_flag = 1 WHERE id = ?1 AND recipient_id = ?2",
                [id, recipient_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unread_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND read_flag = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    fn list_messages_by(
        &self,
        column: &str,
        user_id: &str,
        limit: u32,
        before: Option<&PageCursor>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE {column} = ?1
                   AND (?2 IS NULL OR m.created_at < ?2 OR (m.created_at = ?2 AND m.id < ?4))
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?3"
            );
            let at = before.map(|c| c.at.as_str());
            let id = before.and_then(|c| c.id.as_deref());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, at, limit, id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        recipient_id: row.get(4)?,
        recipient_name: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "unknown".to_string()),
        subject: row.get(6)?,
        body: row.get(7)?,
        read: row.get(8)?,
        created_at: row.get(9)?,
    })
}
