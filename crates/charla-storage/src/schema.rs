// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database schema.
//!
//! Applied on every open; all statements are idempotent
//! (`CREATE ... IF NOT EXISTS`), so a restart against an existing database
//! is a no-op.

use rusqlite::Connection;

/// Full schema: three core tables, the declared-but-unpopulated analytics
/// table, and the covering indices for the hot-path queries.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    phone_number  TEXT NOT NULL UNIQUE,
    display_name  TEXT,
    language      TEXT NOT NULL DEFAULT 'es',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    status           TEXT NOT NULL DEFAULT 'ACTIVE'
                     CHECK (status IN ('ACTIVE', 'CLOSED', 'ARCHIVED')),
    context_summary  TEXT,
    last_message_at  TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY,
    conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role             TEXT NOT NULL CHECK (role IN ('USER', 'ASSISTANT', 'SYSTEM')),
    content          TEXT NOT NULL,
    provider_sid     TEXT UNIQUE,
    metadata         TEXT,
    tokens_used      INTEGER,
    latency_ms       INTEGER,
    created_at       TEXT NOT NULL
);

-- Declared for downstream reporting jobs; the gateway never writes it.
CREATE TABLE IF NOT EXISTS analytics (
    id          TEXT PRIMARY KEY,
    event_type  TEXT NOT NULL,
    user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
    payload     TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone_number);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);
CREATE INDEX IF NOT EXISTS idx_conversations_last_message ON conversations(last_message_at);
CREATE INDEX IF NOT EXISTS idx_conversations_status_user ON conversations(status, user_id);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at);
CREATE INDEX IF NOT EXISTS idx_messages_role_conversation ON messages(role, conversation_id);
";

/// Applies the schema to an open connection.
pub fn apply_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
