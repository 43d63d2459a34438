use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::error::StoreError;
use crate::store::{apply_updates, check_unique_indices, not_found, ProjectStore, ProjectSummary};
use crate::types::{Project, ProjectStatus, Segment, SegmentUpdate};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// `busy_timeout` is set via the `Connection` method rather than a PRAGMA
/// string so it takes effect regardless of pragma caching.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(|db| -> rusqlite::Result<()> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    })
    .await?;

    conn.call(|db| -> rusqlite::Result<()> {
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        crate::schema::migrate(db)
    })
    .await?;

    Ok(conn)
}

/// [`ProjectStore`] over a WAL-mode SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// # Errors
    ///
    /// Same as [`open_db`].
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self { conn: open_db(path).await? })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn read_segment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Segment> {
    Ok(Segment {
        index: r.get(0)?,
        start_ms: r.get(1)?,
        end_ms: r.get(2)?,
        original_text: r.get(3)?,
        proposed_text: r.get(4)?,
        accepted: r.get(5)?,
        edited_text: r.get(6)?,
    })
}

/// Loads a project and its segments inside an open connection.
fn load_project(db: &rusqlite::Connection, owner: &str, id: &str) -> rusqlite::Result<Option<Project>> {
    let header = db
        .query_row(
            "SELECT id, owner, title, status, source_file_name, language, created_at
             FROM projects
             WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
            |r| {
                let status: String = r.get(3)?;
                Ok(Project {
                    id: r.get(0)?,
                    owner: r.get(1)?,
                    title: r.get(2)?,
                    status: ProjectStatus::from_str_lossy(&status),
                    source_file_name: r.get(4)?,
                    language: r.get(5)?,
                    created_at: r.get(6)?,
                    segments: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut project) = header else {
        return Ok(None);
    };

    let mut stmt = db.prepare(
        "SELECT idx, start_ms, end_ms, original_text, proposed_text, accepted, edited_text
         FROM segments
         WHERE project_id = ?1
         ORDER BY idx",
    )?;
    project.segments = stmt
        .query_map(rusqlite::params![id], read_segment)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(project))
}

fn insert_segment(tx: &rusqlite::Transaction<'_>, project_id: &str, segment: &Segment) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO segments
             (project_id, idx, start_ms, end_ms, original_text, proposed_text, accepted, edited_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            project_id,
            segment.index,
            segment.start_ms,
            segment.end_ms,
            &segment.original_text,
            &segment.proposed_text,
            segment.accepted,
            &segment.edited_text,
        ],
    )?;
    Ok(())
}

/// Writes back the reviewer-mutable columns of an existing segment.
fn update_segment(tx: &rusqlite::Transaction<'_>, project_id: &str, segment: &Segment) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE segments
         SET proposed_text = ?3, accepted = ?4, edited_text = ?5
         WHERE project_id = ?1 AND idx = ?2",
        rusqlite::params![
            project_id,
            segment.index,
            &segment.proposed_text,
            segment.accepted,
            &segment.edited_text,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn get(&self, owner: &str, id: &str) -> Result<Option<Project>, StoreError> {
        let owner = owner.to_owned();
        let id = id.to_owned();
        let project = self
            .conn
            .call(move |db| -> rusqlite::Result<Option<Project>> { load_project(db, &owner, &id) })
            .await?;
        Ok(project)
    }

    async fn put(&self, project: &Project) -> Result<(), StoreError> {
        check_unique_indices(project)?;
        let project = project.clone();
        let owner = project.owner.clone();
        let id = project.id.clone();
        let segments = project.segments.len();
        let stored = self
            .conn
            .call(move |db| -> rusqlite::Result<bool> {
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                // A conflicting id owned by someone else updates nothing.
                let written = tx.execute(
                    "INSERT INTO projects
                         (id, owner, title, status, source_file_name, language, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id)
                     DO UPDATE SET title            = excluded.title,
                                   status           = excluded.status,
                                   source_file_name = excluded.source_file_name,
                                   language         = excluded.language
                     WHERE projects.owner = excluded.owner",
                    rusqlite::params![
                        &project.id,
                        &project.owner,
                        &project.title,
                        project.status.as_str(),
                        &project.source_file_name,
                        &project.language,
                        project.created_at,
                    ],
                )?;
                if written == 0 {
                    return Ok(false);
                }
                tx.execute(
                    "DELETE FROM segments
                     WHERE project_id IN (SELECT id FROM projects WHERE id = ?1 AND owner = ?2)",
                    rusqlite::params![&project.id, &project.owner],
                )?;
                for segment in &project.segments {
                    insert_segment(&tx, &project.id, segment)?;
                }
                tx.commit()?;
                Ok(true)
            })
            .await?;
        if !stored {
            return Err(not_found(&owner, &id));
        }
        tracing::debug!(project = %id, segments, "project stored");
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<ProjectSummary>, StoreError> {
        let owner = owner.to_owned();
        let rows = self
            .conn
            .call(move |db| -> rusqlite::Result<Vec<ProjectSummary>> {
                let mut stmt = db.prepare(
                    "SELECT p.id, p.title, p.status, p.source_file_name, p.created_at,
                            COUNT(s.idx),
                            COALESCE(SUM(s.accepted), 0)
                     FROM projects p
                     LEFT JOIN segments s ON s.project_id = p.id
                     WHERE p.owner = ?1
                     GROUP BY p.id
                     ORDER BY p.created_at DESC, p.title",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![&owner], |r| {
                        let status: String = r.get(2)?;
                        let segment_count: i64 = r.get(5)?;
                        let accepted_count: i64 = r.get(6)?;
                        Ok(ProjectSummary {
                            id: r.get(0)?,
                            title: r.get(1)?,
                            status: ProjectStatus::from_str_lossy(&status),
                            source_file_name: r.get(3)?,
                            created_at: r.get(4)?,
                            segment_count: usize::try_from(segment_count).unwrap_or_default(),
                            accepted_count: usize::try_from(accepted_count).unwrap_or_default(),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let owner = owner.to_owned();
        let id = id.to_owned();
        let removed = self
            .conn
            .call(move |db| -> rusqlite::Result<usize> {
                db.execute(
                    "DELETE FROM projects WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![&id, &owner],
                )
            })
            .await?;
        Ok(removed > 0)
    }

    async fn update_segments(
        &self,
        owner: &str,
        id: &str,
        updates: &[SegmentUpdate],
    ) -> Result<Project, StoreError> {
        let owner_key = owner.to_owned();
        let id_key = id.to_owned();
        let updates = updates.to_vec();
        let updated = self
            .conn
            .call(move |db| -> rusqlite::Result<Option<Project>> {
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let Some(mut project) = load_project(&tx, &owner_key, &id_key)? else {
                    return Ok(None);
                };
                apply_updates(&mut project, &updates);
                let touched: HashSet<u32> = updates.iter().map(|u| u.index).collect();
                for segment in project.segments.iter().filter(|s| touched.contains(&s.index)) {
                    update_segment(&tx, &project.id, segment)?;
                }
                tx.commit()?;
                Ok(Some(project))
            })
            .await?;
        updated.ok_or_else(|| not_found(owner, id))
    }
}
