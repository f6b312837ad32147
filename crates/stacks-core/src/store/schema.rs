//! Canonical SQLite schema for the entity store and event log.
//!
//! Layout rules:
//! - one table per aggregate root, each carrying the common sync-metadata
//!   columns (`server_id`, `sync_state`, `revision`, `last_synced_at_us`,
//!   `is_deleted`, `user_id`, `device_id`)
//! - `events` is append-only: the core never issues UPDATE or DELETE
//!   against it
//! - `applied_events` tracks which event ids have been applied to entity
//!   rows, making replay idempotent
//! - `sync_conflicts` persists both versions of an irreconcilable edit
//!   until explicitly resolved

/// Sync-metadata columns shared by every aggregate table.
macro_rules! sync_meta_columns {
    () => {
        "server_id TEXT,
    sync_state TEXT NOT NULL DEFAULT 'pending' CHECK (sync_state IN ('pending', 'synced', 'conflict')),
    revision INTEGER NOT NULL DEFAULT 0,
    last_synced_at_us INTEGER,
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    user_id TEXT NOT NULL DEFAULT '',
    device_id TEXT NOT NULL DEFAULT ''"
    };
}

/// Migration v1: aggregate tables, event log, tracking tables, store meta.
pub const MIGRATION_V1_SQL: &str = concat!(
    "
CREATE TABLE IF NOT EXISTS stacks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    note TEXT,
    status TEXT NOT NULL DEFAULT 'planned' CHECK (status IN ('planned', 'in_progress', 'completed', 'archived')),
    is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
    activated_at_us INTEGER,
    arc_id TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    ",
    sync_meta_columns!(),
    "
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    stack_id TEXT NOT NULL,
    title TEXT NOT NULL,
    note TEXT,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'in_progress', 'completed', 'blocked')),
    completed_at_us INTEGER,
    position INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    ",
    sync_meta_columns!(),
    "
);

CREATE TABLE IF NOT EXISTS reminders (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    remind_at_us INTEGER NOT NULL,
    snoozed_until_us INTEGER,
    status TEXT NOT NULL DEFAULT 'scheduled' CHECK (status IN ('scheduled', 'snoozed', 'delivered', 'cancelled')),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    ",
    sync_meta_columns!(),
    "
);

CREATE TABLE IF NOT EXISTS arcs (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    note TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'abandoned')),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    ",
    sync_meta_columns!(),
    "
);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT '',
    byte_size INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    ",
    sync_meta_columns!(),
    "
);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    ts_us INTEGER NOT NULL,
    actor_type TEXT NOT NULL CHECK (actor_type IN ('human', 'ai', 'system')),
    actor_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    app_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS applied_events (
    event_id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    applied_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_conflicts (
    conflict_id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_kind TEXT NOT NULL CHECK (entity_kind IN ('stack', 'task', 'reminder', 'arc', 'attachment')),
    entity_id TEXT NOT NULL,
    local_revision INTEGER NOT NULL,
    remote_revision INTEGER NOT NULL,
    local_json TEXT NOT NULL,
    remote_json TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'resolved_local', 'resolved_remote')),
    created_at_us INTEGER NOT NULL,
    resolved_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us) VALUES (1, 1, 0);
"
);

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_events_entity
    ON events(entity_id, ts_us DESC, id DESC);

CREATE INDEX IF NOT EXISTS idx_events_replay
    ON events(ts_us ASC, id ASC);

CREATE INDEX IF NOT EXISTS idx_stacks_active
    ON stacks(is_active, is_deleted);

CREATE INDEX IF NOT EXISTS idx_stacks_deleted_updated
    ON stacks(is_deleted, updated_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_tasks_stack
    ON tasks(stack_id, is_deleted, position);

CREATE INDEX IF NOT EXISTS idx_reminders_task
    ON reminders(task_id, is_deleted);

CREATE INDEX IF NOT EXISTS idx_attachments_parent
    ON attachments(parent_id, is_deleted);

CREATE INDEX IF NOT EXISTS idx_applied_events_entity
    ON applied_events(entity_id);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_conflicts_open
    ON sync_conflicts(entity_kind, entity_id) WHERE status = 'open';
";

/// Index names asserted by migration tests.
pub const REQUIRED_INDEXES: [&str; 9] = [
    "idx_events_entity",
    "idx_events_replay",
    "idx_stacks_active",
    "idx_stacks_deleted_updated",
    "idx_tasks_stack",
    "idx_reminders_task",
    "idx_attachments_parent",
    "idx_applied_events_entity",
    "idx_sync_conflicts_open",
];
