use rusqlite::types::Value;

use crate::types::EntityType;
use crate::validation::tag_tokens;

/// Task list filter. Values are matched as given, so an unknown status or
/// priority yields no rows rather than an error.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub parent_task_id: Option<i64>,
    /// Whitespace or comma separated; a task must carry every tag.
    pub tags: Option<String>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub entity_type: Option<String>,
    pub tags: Option<String>,
    pub include_deleted: bool,
}

impl EntityFilter {
    #[must_use]
    pub fn of_type(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type.as_str().to_string()),
            ..Self::default()
        }
    }
}

/// AND-joined WHERE clause with positional parameters.
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    pub fn push_param(&mut self, clause: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(clause.into());
        self.params.push(value.into());
        self
    }

    /// Pushes a clause that binds the same value more than once.
    pub fn push_repeated(
        &mut self,
        clause: impl Into<String>,
        value: impl Into<Value>,
        times: usize,
    ) -> &mut Self {
        let value = value.into();
        self.clauses.push(clause.into());
        for _ in 0..times {
            self.params.push(value.clone());
        }
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameters with LIMIT and OFFSET appended.
    pub fn paged_params(&self, limit: i64, offset: i64) -> Vec<Value> {
        let mut params = self.params.clone();
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));
        params
    }
}

/// `%term%` with LIKE wildcards escaped by backslash, lowercased to match
/// the `fold()` SQL function.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_tags(conditions: &mut Conditions, alias: &str, tags: Option<&str>) {
    for tag in tags.map(tag_tokens).unwrap_or_default() {
        let mut pattern = like_pattern(&tag);
        // surround with the separator so "api" does not match "apis"
        pattern.insert(1, ' ');
        pattern.insert(pattern.len() - 1, ' ');
        conditions.push_param(
            format!("(' ' || fold(coalesce({alias}.tags, '')) || ' ') LIKE ? ESCAPE '\\'"),
            pattern,
        );
    }
}

impl TaskFilter {
    pub fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        if !self.include_deleted {
            conditions.push("t.deleted_at IS NULL");
        }
        if let Some(status) = &self.status {
            conditions.push_param("t.status = ?", status.clone());
        }
        if let Some(priority) = &self.priority {
            conditions.push_param("t.priority = ?", priority.clone());
        }
        if let Some(parent) = self.parent_task_id {
            conditions.push_param("t.parent_task_id = ?", parent);
        }
        push_tags(&mut conditions, "t", self.tags.as_deref());
        conditions
    }
}

impl EntityFilter {
    pub fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        if !self.include_deleted {
            conditions.push("e.deleted_at IS NULL");
        }
        if let Some(entity_type) = &self.entity_type {
            conditions.push_param("e.entity_type = ?", entity_type.clone());
        }
        push_tags(&mut conditions, "e", self.tags.as_deref());
        conditions
    }
}
