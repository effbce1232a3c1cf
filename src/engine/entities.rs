use tracing::{debug, info};

use super::{Workspace, advance, now};
use crate::error::{Error, Result};
use crate::store::EntityFilter;
use crate::types::*;
use crate::validation::{
    normalize_identifier, normalize_tags, validate_description, validate_name,
    validate_search_term,
};

impl Workspace {
    /// Fails `Duplicate` when a live entity of the same type already holds
    /// the identifier.
    pub fn create_entity(&self, input: NewEntity) -> Result<Entity> {
        self.touch();

        let name = validate_name(&input.name)?;
        validate_description(input.description.as_deref())?;
        let tags = normalize_tags(input.tags.as_deref())?;

        let now = now();
        let mut entity = Entity {
            id: 0,
            entity_type: input.entity_type,
            name,
            identifier: normalize_identifier(input.identifier.as_deref()),
            description: input.description,
            metadata: input.metadata,
            tags,
            created_by: input.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        entity.id = self.store.create_entity(&entity)?;

        info!(entity_id = entity.id, entity_type = %entity.entity_type, "created entity");
        Ok(entity)
    }

    pub fn get_entity(&self, id: i64) -> Result<Entity> {
        self.touch();
        self.store
            .get_entity(id, false)?
            .ok_or_else(|| Error::not_found("entity", id))
    }

    pub fn update_entity(&self, id: i64, patch: EntityPatch) -> Result<Entity> {
        self.touch();

        let name = patch.name.as_deref().map(validate_name).transpose()?;
        if let Some(description) = &patch.description {
            validate_description(description.as_deref())?;
        }
        let tags = patch
            .tags
            .as_ref()
            .map(|t| normalize_tags(t.as_deref()))
            .transpose()?;
        let identifier = patch
            .identifier
            .as_ref()
            .map(|i| normalize_identifier(i.as_deref()));

        let mut apply = |entity: &mut Entity| -> Result<()> {
            if let Some(name) = &name {
                entity.name = name.clone();
            }
            if let Some(identifier) = &identifier {
                entity.identifier = identifier.clone();
            }
            if let Some(description) = &patch.description {
                entity.description = description.clone();
            }
            if let Some(metadata) = &patch.metadata {
                entity.metadata = metadata.clone();
            }
            if let Some(tags) = &tags {
                entity.tags = tags.clone();
            }
            if patch.updated_by.is_some() {
                entity.updated_by = patch.updated_by.clone();
            }
            entity.updated_at = advance(entity.updated_at);
            Ok(())
        };

        let entity = self.store.update_entity(id, &mut apply)?;
        debug!(entity_id = id, "updated entity");
        Ok(entity)
    }

    pub fn list_entities(&self, filter: &EntityFilter, page: Pagination) -> Result<Page<Entity>> {
        self.touch();
        let (items, total) = self.store.list_entities(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Case-insensitive substring match on name or identifier.
    pub fn search_entities(
        &self,
        term: &str,
        entity_type: Option<EntityType>,
        page: Pagination,
    ) -> Result<Page<Entity>> {
        self.touch();
        let term = validate_search_term(term)?;
        let (items, total) = self.store.search_entities(&term, entity_type, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Soft-deletes the entity and every live link to it.
    pub fn delete_entity(&self, id: i64) -> Result<EntityDeleteResult> {
        self.touch();
        let deleted_links_count = self.store.delete_entity(id, now())?;
        info!(entity_id = id, deleted_links_count, "deleted entity");
        Ok(EntityDeleteResult {
            success: true,
            deleted_links_count,
        })
    }
}
