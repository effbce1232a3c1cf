use serde::Serialize;

use super::{Entity, EntitySummary, LinkedEntity, LinkedTask, Mode, Task, TaskSummary};
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Validated limit/offset pair. Construct with [`Pagination::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: i64,
    offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Result<Self> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::Pagination {
                field: "limit",
                value: limit,
            });
        }
        if offset < 0 {
            return Err(Error::Pagination {
                field: "offset",
                value: offset,
            });
        }
        Ok(Self { limit, offset })
    }

    /// Applies defaults for unset values before validating.
    pub fn from_optional(limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        Self::new(limit.unwrap_or(DEFAULT_PAGE_SIZE), offset.unwrap_or(0))
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Paginated response for list and search operations
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub returned_count: usize,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total_count: i64, pagination: Pagination) -> Self {
        let returned_count = items.len();
        let has_more = pagination.offset + (returned_count as i64) < total_count;
        Self {
            items,
            total_count,
            returned_count,
            limit: pagination.limit,
            offset: pagination.offset,
            has_more,
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            returned_count: self.returned_count,
            limit: self.limit,
            offset: self.offset,
            has_more: self.has_more,
        }
    }
}

/// Rows that have a reduced representation for summary mode.
pub trait Summarize {
    type Summary: Serialize;

    fn summarize(&self) -> Self::Summary;
}

impl Summarize for Task {
    type Summary = TaskSummary;

    fn summarize(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            title: self.title.clone(),
            status: self.status,
            priority: self.priority,
            parent_task_id: self.parent_task_id,
            tags: self.tags.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl Summarize for Entity {
    type Summary = EntitySummary;

    fn summarize(&self) -> EntitySummary {
        EntitySummary {
            id: self.id,
            entity_type: self.entity_type,
            name: self.name.clone(),
            identifier: self.identifier.clone(),
            tags: self.tags.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl Summarize for LinkedTask {
    type Summary = TaskSummary;

    fn summarize(&self) -> TaskSummary {
        self.task.summarize()
    }
}

impl Summarize for LinkedEntity {
    type Summary = EntitySummary;

    fn summarize(&self) -> EntitySummary {
        self.entity.summarize()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Rendered<T, S> {
    Details(T),
    Summary(S),
}

impl<T: Summarize> Page<T> {
    /// Renders each row at the verbosity requested by `mode`.
    pub fn render(self, mode: Mode) -> Page<Rendered<T, T::Summary>> {
        self.map(|row| match mode {
            Mode::Details => Rendered::Details(row),
            Mode::Summary => {
                let summary = row.summarize();
                Rendered::Summary(summary)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        assert!(Pagination::new(1, 0).is_ok());
        assert!(Pagination::new(1000, 0).is_ok());
        assert!(matches!(
            Pagination::new(0, 0),
            Err(Error::Pagination { field: "limit", value: 0 })
        ));
        assert!(matches!(
            Pagination::new(1001, 0),
            Err(Error::Pagination { field: "limit", value: 1001 })
        ));
        assert!(matches!(
            Pagination::new(10, -1),
            Err(Error::Pagination { field: "offset", value: -1 })
        ));
    }

    #[test]
    fn test_page_metadata() {
        let page = Page::new(vec![1, 2], 5, Pagination::new(2, 2).unwrap());
        assert_eq!(page.returned_count, 2);
        assert_eq!(page.total_count, 5);
        assert!(page.has_more);

        let past_end = Page::<i32>::new(vec![], 5, Pagination::new(10, 10_000).unwrap());
        assert_eq!(past_end.returned_count, 0);
        assert!(!past_end.has_more);
    }
}
