use serde_json::{Value, json};

use super::commands::EntityCommands;
use super::output::to_json;
use super::task::{clearable, page_options};
use crate::engine::Workspace;
use crate::store::{EntityFilter, TaskFilter};
use crate::types::{EntityPatch, EntityType, Metadata, NewEntity};

pub fn run_entity(workspace: &Workspace, command: EntityCommands) -> anyhow::Result<Value> {
    match command {
        EntityCommands::Create {
            entity_type,
            name,
            identifier,
            description,
            metadata,
            tags,
            created_by,
        } => {
            let input = NewEntity {
                entity_type: entity_type.parse()?,
                name,
                identifier,
                description,
                metadata: metadata.map(Metadata::from),
                tags,
                created_by,
            };
            to_json(&workspace.create_entity(input)?)
        }
        EntityCommands::Get { id } => to_json(&workspace.get_entity(id)?),
        EntityCommands::Update {
            id,
            name,
            identifier,
            description,
            metadata,
            tags,
            updated_by,
        } => {
            let patch = EntityPatch {
                name,
                identifier: clearable(identifier),
                description: clearable(description),
                metadata: clearable(metadata).map(|m| m.map(Metadata::from)),
                tags: clearable(tags),
                updated_by,
            };
            to_json(&workspace.update_entity(id, patch)?)
        }
        EntityCommands::List {
            entity_type,
            tags,
            include_deleted,
            page,
        } => {
            let (pagination, mode) = page_options(&page)?;
            let filter = EntityFilter {
                entity_type,
                tags,
                include_deleted,
            };
            to_json(&workspace.list_entities(&filter, pagination)?.render(mode))
        }
        EntityCommands::Search {
            term,
            entity_type,
            page,
        } => {
            let (pagination, mode) = page_options(&page)?;
            let entity_type: Option<EntityType> =
                entity_type.as_deref().map(str::parse).transpose()?;
            to_json(
                &workspace
                    .search_entities(&term, entity_type, pagination)?
                    .render(mode),
            )
        }
        EntityCommands::Delete { id } => to_json(&workspace.delete_entity(id)?),
        EntityCommands::Link {
            task_id,
            entity_id,
            created_by,
        } => to_json(&workspace.link_entity_to_task(task_id, entity_id, created_by.as_deref())?),
        EntityCommands::Unlink { task_id, entity_id } => {
            workspace.unlink_entity_from_task(task_id, entity_id)?;
            Ok(json!({ "success": true }))
        }
        EntityCommands::Tasks {
            id,
            status,
            priority,
            page,
        } => {
            let (pagination, mode) = page_options(&page)?;
            let filter = TaskFilter {
                status,
                priority,
                ..TaskFilter::default()
            };
            to_json(
                &workspace
                    .get_entity_tasks(id, &filter, pagination)?
                    .render(mode),
            )
        }
    }
}
