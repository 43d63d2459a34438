//! Project persistence behind an owner-scoped key-value interface.
//!
//! Pipeline code never touches storage. The CLI works against
//! [`ProjectStore`], backed by SQLite in normal use (`db::SqliteStore`) and by
//! [`MemoryStore`] for offline runs and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{Project, ProjectStatus, SegmentUpdate};

/// Listing row for a project, without its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub status: ProjectStatus,
    pub source_file_name: Option<String>,
    pub created_at: i64,
    pub segment_count: usize,
    pub accepted_count: usize,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            title: project.title.clone(),
            status: project.status,
            source_file_name: project.source_file_name.clone(),
            created_at: project.created_at,
            segment_count: project.segments.len(),
            accepted_count: project.accepted_count(),
        }
    }
}

/// Storage for projects, scoped by owner id and project id.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// # Errors
    ///
    /// Backend failures only; a missing project is `Ok(None)`.
    async fn get(&self, owner: &str, id: &str) -> Result<Option<Project>, StoreError>;

    /// Inserts or fully replaces `project`, segments included.
    ///
    /// # Errors
    ///
    /// - `DuplicateSegment` when two segments share an index.
    /// - `NotFound` when the id already belongs to another owner.
    /// - Backend failures.
    async fn put(&self, project: &Project) -> Result<(), StoreError>;

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn list(&self, owner: &str) -> Result<Vec<ProjectSummary>, StoreError>;

    /// Returns whether a project was removed.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn delete(&self, owner: &str, id: &str) -> Result<bool, StoreError>;

    /// Applies reviewer updates and returns the updated project. Updates for
    /// indices the project does not have are skipped.
    ///
    /// # Errors
    ///
    /// `NotFound` when the project does not exist for `owner`.
    async fn update_segments(
        &self,
        owner: &str,
        id: &str,
        updates: &[SegmentUpdate],
    ) -> Result<Project, StoreError>;
}

/// Applies `updates` in order; returns how many touched a segment.
pub fn apply_updates(project: &mut Project, updates: &[SegmentUpdate]) -> usize {
    let mut touched = 0;
    for update in updates.iter().filter(|u| !u.is_empty()) {
        if let Some(segment) = project.segments.iter_mut().find(|s| s.index == update.index) {
            update.apply_to(segment);
            touched += 1;
        }
    }
    touched
}

pub(crate) fn not_found(owner: &str, id: &str) -> StoreError {
    StoreError::NotFound { owner: owner.to_owned(), project: id.to_owned() }
}

/// Segment indices key the stored rows, so they must be unique per project.
pub(crate) fn check_unique_indices(project: &Project) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    match project.segments.iter().find(|s| !seen.insert(s.index)) {
        Some(segment) => Err(StoreError::DuplicateSegment {
            project: project.id.clone(),
            index: segment.index,
        }),
        None => Ok(()),
    }
}

/// In-process store keyed by owner, then project id. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, HashMap<String, Project>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get(&self, owner: &str, id: &str) -> Result<Option<Project>, StoreError> {
        let projects = self.projects.read().await;
        Ok(projects.get(owner).and_then(|owned| owned.get(id)).cloned())
    }

    async fn put(&self, project: &Project) -> Result<(), StoreError> {
        check_unique_indices(project)?;
        let mut projects = self.projects.write().await;
        let taken = projects
            .iter()
            .any(|(owner, owned)| *owner != project.owner && owned.contains_key(&project.id));
        if taken {
            return Err(not_found(&project.owner, &project.id));
        }

        let mut stored = project.clone();
        stored.segments.sort_by_key(|s| s.index);
        projects
            .entry(project.owner.clone())
            .or_default()
            .insert(project.id.clone(), stored);
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<ProjectSummary>, StoreError> {
        let projects = self.projects.read().await;
        let mut summaries: Vec<ProjectSummary> = projects
            .get(owner)
            .map(|owned| owned.values().map(ProjectSummary::from).collect())
            .unwrap_or_default();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(summaries)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<bool, StoreError> {
        let mut projects = self.projects.write().await;
        Ok(projects.get_mut(owner).and_then(|owned| owned.remove(id)).is_some())
    }

    async fn update_segments(
        &self,
        owner: &str,
        id: &str,
        updates: &[SegmentUpdate],
    ) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(owner)
            .and_then(|owned| owned.get_mut(id))
            .ok_or_else(|| not_found(owner, id))?;
        apply_updates(project, updates);
        Ok(project.clone())
    }
}
