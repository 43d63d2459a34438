/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the v1 schema.
///
/// - `projects`: one row per uploaded transcript, keyed by UUID v4 text and
///   scoped by `owner`.
/// - `segments`: one row per caption cue, keyed by `(project_id, idx)`.
///
/// Both tables are `STRICT`. Deleting a project cascades to its segments.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        id               TEXT    PRIMARY KEY,
        owner            TEXT    NOT NULL,
        title            TEXT    NOT NULL,
        status           TEXT    NOT NULL DEFAULT 'review'
                                 CHECK(status IN ('processing', 'review')),
        source_file_name TEXT,
        language         TEXT,
        created_at       INTEGER NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS projects_owner_created
        ON projects (owner, created_at DESC);

    CREATE TABLE IF NOT EXISTS segments (
        project_id    TEXT    NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        idx           INTEGER NOT NULL CHECK(idx > 0),
        start_ms      INTEGER NOT NULL,
        end_ms        INTEGER NOT NULL,
        original_text TEXT    NOT NULL,
        proposed_text TEXT    NOT NULL,
        accepted      INTEGER NOT NULL DEFAULT 0,
        edited_text   TEXT,
        PRIMARY KEY (project_id, idx)
    ) STRICT;
";

/// Runs forward-only schema migration to the latest version.
///
/// Idempotent: safe to call on every open.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}
