use anyhow::Context;
use rusqlite::Connection;

/// Ordered schema batches, applied once each and recorded in the
/// `_migrations` ledger. Embedded so `:memory:` databases in tests get
/// the exact same schema as a file-backed one.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_users",
        "CREATE TABLE users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            name TEXT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user'
                CHECK (role IN ('user', 'lawyer', 'admin')),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_sessions_user ON sessions(user_id);",
    ),
    (
        "0002_lawyer_profiles",
        "CREATE TABLE lawyer_profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            bio TEXT,
            specialization TEXT NOT NULL,
            license_number TEXT NOT NULL UNIQUE,
            experience INTEGER NOT NULL DEFAULT 0,
            city TEXT,
            state TEXT,
            available_slots TEXT NOT NULL DEFAULT '[]',
            fees INTEGER NOT NULL DEFAULT 0,
            is_verified INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    ),
    (
        "0003_appointments",
        "CREATE TABLE appointments (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL REFERENCES users(id),
            lawyer_id TEXT NOT NULL REFERENCES users(id),
            date TEXT NOT NULL,
            time_slot TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'cancelled', 'completed')),
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_appointments_client ON appointments(client_id);
        CREATE INDEX idx_appointments_lawyer ON appointments(lawyer_id);

        -- A slot is only occupied while its appointment is still live;
        -- rejected, cancelled and completed bookings free it again.
        CREATE UNIQUE INDEX idx_appointments_lawyer_slot
            ON appointments(lawyer_id, date, time_slot)
            WHERE status IN ('pending', 'approved');

        CREATE UNIQUE INDEX idx_appointments_client_slot
            ON appointments(client_id, date, time_slot)
            WHERE status IN ('pending', 'approved');",
    ),
    (
        "0004_chat",
        "CREATE TABLE chat_rooms (
            id TEXT PRIMARY KEY,
            appointment_id TEXT NOT NULL UNIQUE REFERENCES appointments(id) ON DELETE CASCADE,
            client_id TEXT NOT NULL REFERENCES users(id),
            lawyer_id TEXT NOT NULL REFERENCES users(id),
            last_message TEXT,
            last_message_at TEXT,
            last_message_sender_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE messages (
            id TEXT PRIMARY KEY,
            chat_room_id TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            sender_id TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            content TEXT NOT NULL,
            seen INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_messages_room ON messages(chat_room_id, created_at);",
    ),
    (
        "0005_reviews",
        "CREATE TABLE reviews (
            id TEXT PRIMARY KEY,
            lawyer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE UNIQUE INDEX idx_reviews_lawyer_author ON reviews(lawyer_id, author_id);",
    ),
    (
        "0006_rate_limits",
        "CREATE TABLE rate_limits (
            principal TEXT NOT NULL,
            window_start TEXT NOT NULL,
            request_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (principal, window_start)
        );",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
