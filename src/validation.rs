use crate::error::{Error, Result};
use crate::types::TaskStatus;

pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_NAME_LEN: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_TAG_LEN: usize = 64;

fn validate_label(value: &str, field: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "cannot be empty"));
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(Error::validation(
            field,
            format!("length {len} exceeds {max_len} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_title(title: &str) -> Result<String> {
    validate_label(title, "title", MAX_TITLE_LEN)
}

pub fn validate_name(name: &str) -> Result<String> {
    validate_label(name, "name", MAX_NAME_LEN)
}

pub fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(text) = description {
        let len = text.chars().count();
        if len > MAX_DESCRIPTION_LEN {
            return Err(Error::validation(
                "description",
                format!("length {len} exceeds {MAX_DESCRIPTION_LEN} characters"),
            ));
        }
    }
    Ok(())
}

/// Enforces that `blocker_reason` is present exactly when the task is blocked.
pub fn validate_blocker(status: TaskStatus, blocker_reason: Option<&str>) -> Result<()> {
    let has_reason = blocker_reason.is_some_and(|r| !r.trim().is_empty());
    match (status, has_reason) {
        (TaskStatus::Blocked, false) => Err(Error::validation(
            "blocker_reason",
            "required when status is 'blocked'",
        )),
        (TaskStatus::Blocked, true) => Ok(()),
        (other, true) => Err(Error::validation(
            "blocker_reason",
            format!("must be empty when status is '{other}'"),
        )),
        (_, false) => Ok(()),
    }
}

/// Lowercases, splits on whitespace or commas, drops duplicates (first wins)
/// and joins with single spaces. Returns `None` when no tokens remain.
pub fn normalize_tags(tags: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = tags else {
        return Ok(None);
    };

    let mut tokens: Vec<String> = Vec::new();
    for token in raw.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let token = token.to_lowercase();
        if token.chars().count() > MAX_TAG_LEN {
            return Err(Error::validation(
                "tags",
                format!("tag '{token}' exceeds {MAX_TAG_LEN} characters"),
            ));
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    if tokens.is_empty() {
        Ok(None)
    } else {
        Ok(Some(tokens.join(" ")))
    }
}

/// Splits a tag filter into normalized tokens.
pub fn tag_tokens(tags: &str) -> Vec<String> {
    normalize_tags(Some(tags))
        .ok()
        .flatten()
        .map(|t| t.split(' ').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Removes repeated ids while keeping first-seen order.
pub fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

/// Blank identifiers are stored as NULL so they never take part in uniqueness.
pub fn normalize_identifier(identifier: Option<&str>) -> Option<String> {
    identifier
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn validate_search_term(term: &str) -> Result<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("term", "search term cannot be empty"));
    }
    Ok(trimmed.to_string())
}
