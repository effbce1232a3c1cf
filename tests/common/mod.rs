//! Shared fixture: a tracker over a temp data dir with one workspace open.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use taskmill::config::EngineConfig;
use taskmill::engine::{Tracker, Workspace};
use taskmill::types::{EntityType, NewEntity, NewTask, Task};
use tempfile::TempDir;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub tracker: Tracker,
    pub workspace: Workspace,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = EngineConfig::with_data_dir(temp_dir.path().join("data"));
        let tracker = Tracker::open(config).expect("failed to open tracker");

        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).expect("failed to create project dir");
        let workspace = tracker
            .workspace_at(&project)
            .expect("failed to open workspace");

        Self {
            temp_dir,
            tracker,
            workspace,
        }
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join(name);
        fs::create_dir_all(&dir).expect("failed to create project dir");
        dir
    }

    pub fn task(&self, title: &str) -> Task {
        self.workspace
            .create_task(NewTask::new(title))
            .expect("failed to create task")
    }

    pub fn file_entity(&self, identifier: &str) -> taskmill::types::Entity {
        self.workspace
            .create_entity(NewEntity::new(EntityType::File, identifier).with_identifier(identifier))
            .expect("failed to create entity")
    }
}
