//! # Project Store
//!
//! Projects and their ordered shots. Each project record and each project's shot
//! list is locked independently; nothing here takes two locks at once.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{Result, StoryforgeError};
use crate::models::{NewProject, NewShot, Project, ProjectPatch, Shot, ShotPatch};

/// Persistence seam for projects and shots
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, new_project: NewProject) -> Result<Project>;

    async fn get_project(&self, project_id: &str) -> Result<Project>;

    /// Merge a patch into the project; status never regresses
    async fn update_project(&self, project_id: &str, patch: ProjectPatch) -> Result<Project>;

    /// Remove a project together with its shots
    async fn delete_project(&self, project_id: &str) -> Result<()>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Create all shots of a project at once, ordered 1..=N
    async fn create_shots(&self, project_id: &str, shots: Vec<NewShot>) -> Result<Vec<Shot>>;

    /// Drop every shot of a project, returning how many were removed
    async fn delete_shots(&self, project_id: &str) -> Result<usize>;

    /// Shots of a project in order; empty before the storyboard exists
    async fn list_shots(&self, project_id: &str) -> Result<Vec<Shot>>;

    async fn get_shot(&self, shot_id: &str) -> Result<Shot>;

    async fn shot_by_order(&self, project_id: &str, order: u32) -> Result<Shot>;

    /// Merge a patch into one shot; the shot's other fields survive
    async fn update_shot(&self, shot_id: &str, patch: ShotPatch) -> Result<Shot>;
}

/// `DashMap`-backed project store
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: DashMap<String, Project>,
    shots: DashMap<String, Vec<Shot>>,
    /// shot id -> project id
    shot_index: DashMap<String, String>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_of_shot(&self, shot_id: &str) -> Result<String> {
        self.shot_index
            .get(shot_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoryforgeError::shot_not_found(shot_id))
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create_project(&self, new_project: NewProject) -> Result<Project> {
        new_project.validate()?;
        let project = Project::from_new(new_project);
        self.projects.insert(project.id.clone(), project.clone());
        debug!(project_id = %project.id, "Project created");
        Ok(project)
    }

    async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.projects
            .get(project_id)
            .map(|p| p.clone())
            .ok_or_else(|| StoryforgeError::project_not_found(project_id))
    }

    #[instrument(skip(self, patch))]
    async fn update_project(&self, project_id: &str, patch: ProjectPatch) -> Result<Project> {
        let mut project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoryforgeError::project_not_found(project_id))?;
        project.apply(patch);
        Ok(project.clone())
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.projects
            .remove(project_id)
            .ok_or_else(|| StoryforgeError::project_not_found(project_id))?;
        if let Some((_, shots)) = self.shots.remove(project_id) {
            for shot in shots {
                self.shot_index.remove(&shot.id);
            }
        }
        debug!(project_id = %project_id, "Project deleted");
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self.projects.iter().map(|p| p.clone()).collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    #[instrument(skip(self, shots), fields(count = shots.len()))]
    async fn create_shots(&self, project_id: &str, shots: Vec<NewShot>) -> Result<Vec<Shot>> {
        if !self.projects.contains_key(project_id) {
            return Err(StoryforgeError::project_not_found(project_id));
        }

        let created: Vec<Shot> = shots
            .into_iter()
            .enumerate()
            .map(|(idx, new_shot)| Shot::from_new(project_id, idx as u32 + 1, new_shot))
            .collect();

        match self.shots.entry(project_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoryforgeError::InvalidState(format!(
                    "project {project_id} already has shots"
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(created.clone());
            }
        }
        for shot in &created {
            self.shot_index
                .insert(shot.id.clone(), project_id.to_string());
        }
        Ok(created)
    }

    async fn delete_shots(&self, project_id: &str) -> Result<usize> {
        let Some((_, shots)) = self.shots.remove(project_id) else {
            return Ok(0);
        };
        for shot in &shots {
            self.shot_index.remove(&shot.id);
        }
        debug!(project_id = %project_id, removed = shots.len(), "Shots deleted");
        Ok(shots.len())
    }

    async fn list_shots(&self, project_id: &str) -> Result<Vec<Shot>> {
        if !self.projects.contains_key(project_id) {
            return Err(StoryforgeError::project_not_found(project_id));
        }
        Ok(self
            .shots
            .get(project_id)
            .map(|shots| shots.clone())
            .unwrap_or_default())
    }

    async fn get_shot(&self, shot_id: &str) -> Result<Shot> {
        let project_id = self.project_of_shot(shot_id)?;
        self.shots
            .get(&project_id)
            .and_then(|shots| shots.iter().find(|s| s.id == shot_id).cloned())
            .ok_or_else(|| StoryforgeError::shot_not_found(shot_id))
    }

    async fn shot_by_order(&self, project_id: &str, order: u32) -> Result<Shot> {
        self.shots
            .get(project_id)
            .and_then(|shots| shots.iter().find(|s| s.order == order).cloned())
            .ok_or_else(|| StoryforgeError::shot_not_found(format!("{project_id}#{order}")))
    }

    async fn update_shot(&self, shot_id: &str, patch: ShotPatch) -> Result<Shot> {
        let project_id = self.project_of_shot(shot_id)?;
        let mut shots = self
            .shots
            .get_mut(&project_id)
            .ok_or_else(|| StoryforgeError::shot_not_found(shot_id))?;
        let shot = shots
            .iter_mut()
            .find(|s| s.id == shot_id)
            .ok_or_else(|| StoryforgeError::shot_not_found(shot_id))?;
        shot.apply(patch);
        Ok(shot.clone())
    }
}
