//! SQL schema for the vault store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS vaults (
    vault_id              TEXT PRIMARY KEY,
    owner_email           TEXT NOT NULL,
    owner_contact_ref     TEXT,
    document_ref          TEXT NOT NULL,
    document_url          TEXT NOT NULL,
    attachment_ref        TEXT,
    trustees              TEXT NOT NULL,   -- JSON array of addresses
    checkin_interval_days INTEGER NOT NULL CHECK (checkin_interval_days > 0),
    grace_hours           INTEGER NOT NULL CHECK (grace_hours > 0),
    last_checkin_at       TEXT NOT NULL,   -- fixed-width RFC 3339 UTC
    status                TEXT NOT NULL
                          CHECK (status IN ('ACTIVE', 'DEACTIVATED', 'ACTIVATED')),
    created_at            TEXT NOT NULL,
    last_reminder_at      TEXT,
    activated_notified_at TEXT,
    -- Bumped by every UPDATE; reminder stamps are conditional on it.
    version               INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS vaults_contact_idx ON vaults(owner_contact_ref);
CREATE INDEX IF NOT EXISTS vaults_status_idx  ON vaults(status);

PRAGMA user_version = 1;
";
