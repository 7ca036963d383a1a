use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                TEXT PRIMARY KEY,
                email             TEXT NOT NULL UNIQUE,
                name              TEXT NOT NULL,
                password          TEXT NOT NULL,
                role              TEXT NOT NULL DEFAULT 'user'
                                  CHECK (role IN ('user', 'doctor', 'admin')),
                specialization    TEXT,
                available         INTEGER NOT NULL DEFAULT 0,
                reset_token_hash  TEXT,
                reset_expires_at  TEXT,
                created_at        TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_reset_token ON users(reset_token_hash);

            CREATE TABLE activities (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind              TEXT NOT NULL,
                duration_minutes  INTEGER NOT NULL,
                calories          INTEGER NOT NULL,
                notes             TEXT,
                performed_at      TEXT NOT NULL,
                created_at        TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_activities_user ON activities(user_id, performed_at);

            CREATE TABLE habits (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name            TEXT NOT NULL,
                description     TEXT,
                frequency       TEXT NOT NULL DEFAULT 'daily'
                                CHECK (frequency IN ('daily', 'weekly')),
                current_streak  INTEGER NOT NULL DEFAULT 0,
                longest_streak  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_habits_user ON habits(user_id);

            CREATE TABLE habit_completions (
                id                  TEXT PRIMARY KEY,
                habit_id            TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
                user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                completed_on        TEXT NOT NULL,
                proof_path          TEXT NOT NULL,
                proof_content_type  TEXT NOT NULL,
                proof_sha256        TEXT NOT NULL,
                note                TEXT,
                status              TEXT NOT NULL DEFAULT 'pending'
                                    CHECK (status IN ('pending', 'approved', 'rejected')),
                reviewer_id         TEXT REFERENCES users(id) ON DELETE SET NULL,
                review_note         TEXT,
                submitted_at        TEXT NOT NULL DEFAULT (datetime('now')),
                reviewed_at         TEXT
            );

            CREATE INDEX idx_completions_status ON habit_completions(status, submitted_at);

            -- One live (pending or approved) completion per habit per day
            CREATE UNIQUE INDEX idx_completions_live
                ON habit_completions(habit_id, completed_on)
                WHERE status != 'rejected';

            CREATE TABLE assessments (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                responses           TEXT NOT NULL,
                score               REAL NOT NULL,
                severity            TEXT NOT NULL,
                category_scores     TEXT NOT NULL,
                recommendations     TEXT NOT NULL,
                assigned_doctor_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_assessments_user ON assessments(user_id, created_at);
            CREATE INDEX idx_assessments_doctor ON assessments(assigned_doctor_id);

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                thread_id     TEXT NOT NULL,
                sender_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                subject       TEXT NOT NULL,
                body          TEXT NOT NULL,
                read_flag     INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_messages_recipient ON messages(recipient_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_thread ON messages(thread_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
