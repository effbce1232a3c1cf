//! Task lifecycle tests against a real workspace store.

mod common;

use std::collections::HashSet;

use common::TestContext;
use taskmill::error::Error;
use taskmill::store::TaskFilter;
use taskmill::types::*;

#[test]
fn test_create_get_round_trip() {
    let ctx = TestContext::new();

    let created = ctx
        .workspace
        .create_task(NewTask {
            description: Some("split the parser".to_string()),
            priority: Some(Priority::High),
            depends_on: vec![7, 3, 7],
            tags: Some("Backend, api backend".to_string()),
            file_references: vec!["src/parser.rs".to_string()],
            created_by: Some("agent-1".to_string()),
            ..NewTask::new("  Refactor parser  ")
        })
        .unwrap();

    assert_eq!(created.title, "Refactor parser");
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(created.depends_on, vec![7, 3]);
    assert_eq!(created.tags.as_deref(), Some("backend api"));
    assert_eq!(created.created_at, created.updated_at);
    assert!(created.completed_at.is_none());

    let fetched = ctx.workspace.get_task(created.id).unwrap();
    assert_eq!(fetched, created);
}

#[test]
fn test_create_validates_input() {
    let ctx = TestContext::new();

    let err = ctx.workspace.create_task(NewTask::new("   ")).unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "title"));

    let err = ctx
        .workspace
        .create_task(NewTask::new("x".repeat(501)))
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "title"));

    let err = ctx
        .workspace
        .create_task(NewTask {
            description: Some("d".repeat(10_001)),
            ..NewTask::new("long")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "description"));

    let err = ctx
        .workspace
        .create_task(NewTask {
            status: Some(TaskStatus::Blocked),
            ..NewTask::new("blocked")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "blocker_reason"));

    let err = ctx
        .workspace
        .create_task(NewTask {
            parent_task_id: Some(999),
            ..NewTask::new("orphan")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "parent_task_id"));
}

#[test]
fn test_create_done_sets_completed_at() {
    let ctx = TestContext::new();
    let task = ctx
        .workspace
        .create_task(NewTask {
            status: Some(TaskStatus::Done),
            ..NewTask::new("already finished")
        })
        .unwrap();
    assert_eq!(task.completed_at, Some(task.created_at));
}

#[test]
fn test_blocked_requires_reason() {
    let ctx = TestContext::new();
    let task = ctx.task("needs review");

    let err = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::Blocked),
                ..TaskPatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "blocker_reason"));

    let blocked = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::Blocked),
                blocker_reason: Some(Some("waiting on X".to_string())),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(blocked.blocker_reason.as_deref(), Some("waiting on X"));
    assert_eq!(
        ctx.workspace.get_task(task.id).unwrap().blocker_reason.as_deref(),
        Some("waiting on X")
    );

    let unblocked = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::InProgress),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert!(unblocked.blocker_reason.is_none());
}

#[test]
fn test_done_transitions_track_completed_at() {
    let ctx = TestContext::new();
    let task = ctx.task("ship it");

    let done = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::Done),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert!(done.completed_at.is_some());
    assert!(done.updated_at > task.updated_at);

    let retitled = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                title: Some("ship it now".to_string()),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert_eq!(retitled.completed_at, done.completed_at);
    assert!(retitled.updated_at > done.updated_at);

    let reopened = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                status: Some(TaskStatus::Todo),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert!(reopened.completed_at.is_none());
}

#[test]
fn test_update_clears_optional_fields() {
    let ctx = TestContext::new();
    let task = ctx
        .workspace
        .create_task(NewTask {
            description: Some("temporary".to_string()),
            tags: Some("one two".to_string()),
            ..NewTask::new("clear me")
        })
        .unwrap();

    let updated = ctx
        .workspace
        .update_task(
            task.id,
            TaskPatch {
                description: Some(None),
                tags: Some(None),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert!(updated.description.is_none());
    assert!(updated.tags.is_none());
    assert_eq!(updated.title, "clear me");
}

#[test]
fn test_update_missing_or_deleted_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx
        .workspace
        .update_task(404, TaskPatch::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "task", .. }));

    let task = ctx.task("gone");
    ctx.workspace.delete_task(task.id, false).unwrap();
    let err = ctx
        .workspace
        .update_task(task.id, TaskPatch::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "task", .. }));
}

#[test]
fn test_delete_twice_is_not_found() {
    let ctx = TestContext::new();
    let task = ctx.task("once");

    let result = ctx.workspace.delete_task(task.id, false).unwrap();
    assert!(result.success);
    assert_eq!(result.deleted_count, 1);

    let err = ctx.workspace.delete_task(task.id, false).unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "task", .. }));
    assert!(matches!(
        ctx.workspace.get_task(task.id),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_cascade_delete_covers_subtree_and_links() {
    let ctx = TestContext::new();
    let parent = ctx.task("epic");
    let child = ctx
        .workspace
        .create_task(NewTask {
            parent_task_id: Some(parent.id),
            ..NewTask::new("story")
        })
        .unwrap();
    let grandchild = ctx
        .workspace
        .create_task(NewTask {
            parent_task_id: Some(child.id),
            ..NewTask::new("subtask")
        })
        .unwrap();
    let entity = ctx.file_entity("/src/lib.rs");
    ctx.workspace
        .link_entity_to_task(grandchild.id, entity.id, None)
        .unwrap();

    let result = ctx.workspace.delete_task(parent.id, true).unwrap();
    assert_eq!(result.deleted_count, 4);

    for id in [parent.id, child.id, grandchild.id] {
        assert!(matches!(
            ctx.workspace.get_task(id),
            Err(Error::NotFound { .. })
        ));
    }
    let linked = ctx
        .workspace
        .get_entity_tasks(entity.id, &TaskFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(linked.total_count, 0);
}

#[test]
fn test_plain_delete_orphans_children() {
    let ctx = TestContext::new();
    let parent = ctx.task("epic");
    let child = ctx
        .workspace
        .create_task(NewTask {
            parent_task_id: Some(parent.id),
            ..NewTask::new("story")
        })
        .unwrap();

    ctx.workspace.delete_task(parent.id, false).unwrap();

    let child = ctx.workspace.get_task(child.id).unwrap();
    assert_eq!(child.parent_task_id, Some(parent.id));
}

#[test]
fn test_task_tree_nests_children_in_creation_order() {
    let ctx = TestContext::new();
    let root = ctx.task("root");
    let mut child_ids = Vec::new();
    for title in ["first", "second"] {
        let child = ctx
            .workspace
            .create_task(NewTask {
                parent_task_id: Some(root.id),
                ..NewTask::new(title)
            })
            .unwrap();
        child_ids.push(child.id);
    }
    ctx.workspace
        .create_task(NewTask {
            parent_task_id: Some(child_ids[0]),
            ..NewTask::new("nested")
        })
        .unwrap();

    let tree = ctx.workspace.get_task_tree(root.id).unwrap();
    assert_eq!(tree.size(), 4);
    let ids: Vec<i64> = tree.children.iter().map(|c| c.task.id).collect();
    assert_eq!(ids, child_ids);
    assert_eq!(tree.children[0].children[0].task.title, "nested");
}

#[test]
fn test_task_tree_survives_parent_cycle() {
    let ctx = TestContext::new();
    let a = ctx.task("a");
    let b = ctx
        .workspace
        .create_task(NewTask {
            parent_task_id: Some(a.id),
            ..NewTask::new("b")
        })
        .unwrap();
    ctx.workspace
        .update_task(
            a.id,
            TaskPatch {
                parent_task_id: Some(Some(b.id)),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let tree = ctx.workspace.get_task_tree(a.id).unwrap();
    assert_eq!(tree.size(), 2);
}

#[test]
fn test_next_tasks_follow_dependencies() {
    let ctx = TestContext::new();
    let a = ctx.task("A");
    let b = ctx
        .workspace
        .create_task(NewTask {
            depends_on: vec![a.id],
            ..NewTask::new("B")
        })
        .unwrap();

    let next: Vec<i64> = ctx
        .workspace
        .get_next_tasks()
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert!(next.contains(&a.id));
    assert!(!next.contains(&b.id));

    ctx.workspace
        .update_task(
            a.id,
            TaskPatch {
                status: Some(TaskStatus::Done),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let next: Vec<i64> = ctx
        .workspace
        .get_next_tasks()
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert!(next.contains(&b.id));
    assert!(!next.contains(&a.id));
}

#[test]
fn test_next_tasks_fail_closed_and_order_by_priority() {
    let ctx = TestContext::new();
    let done = ctx
        .workspace
        .create_task(NewTask {
            status: Some(TaskStatus::Done),
            ..NewTask::new("done dep")
        })
        .unwrap();
    let deleted = ctx
        .workspace
        .create_task(NewTask {
            status: Some(TaskStatus::Done),
            ..NewTask::new("deleted dep")
        })
        .unwrap();
    ctx.workspace.delete_task(deleted.id, false).unwrap();

    let low = ctx
        .workspace
        .create_task(NewTask {
            priority: Some(Priority::Low),
            ..NewTask::new("low")
        })
        .unwrap();
    let high = ctx
        .workspace
        .create_task(NewTask {
            priority: Some(Priority::High),
            depends_on: vec![done.id],
            ..NewTask::new("high")
        })
        .unwrap();
    let medium_old = ctx.task("medium old");
    let medium_new = ctx.task("medium new");
    let missing_dep = ctx
        .workspace
        .create_task(NewTask {
            depends_on: vec![9_999],
            ..NewTask::new("missing dep")
        })
        .unwrap();
    let deleted_dep = ctx
        .workspace
        .create_task(NewTask {
            depends_on: vec![deleted.id],
            ..NewTask::new("deleted dep")
        })
        .unwrap();

    let next: Vec<i64> = ctx
        .workspace
        .get_next_tasks()
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(next, vec![high.id, medium_old.id, medium_new.id, low.id]);
    assert!(!next.contains(&missing_dep.id));
    assert!(!next.contains(&deleted_dep.id));
}

#[test]
fn test_dependency_cycle_is_never_actionable() {
    let ctx = TestContext::new();
    let a = ctx.task("a");
    let b = ctx
        .workspace
        .create_task(NewTask {
            depends_on: vec![a.id],
            ..NewTask::new("b")
        })
        .unwrap();
    ctx.workspace
        .update_task(
            a.id,
            TaskPatch {
                depends_on: Some(vec![b.id]),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    assert!(ctx.workspace.get_next_tasks().unwrap().is_empty());
}

#[test]
fn test_blocked_tasks_lists_only_blocked() {
    let ctx = TestContext::new();
    ctx.task("free");
    let blocked = ctx
        .workspace
        .create_task(NewTask {
            status: Some(TaskStatus::Blocked),
            blocker_reason: Some("CI is down".to_string()),
            ..NewTask::new("stuck")
        })
        .unwrap();

    let tasks = ctx.workspace.get_blocked_tasks().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, blocked.id);
}

#[test]
fn test_list_filters_and_ordering() {
    let ctx = TestContext::new();
    let first = ctx
        .workspace
        .create_task(NewTask {
            tags: Some("api backend".to_string()),
            ..NewTask::new("first")
        })
        .unwrap();
    let second = ctx
        .workspace
        .create_task(NewTask {
            tags: Some("api".to_string()),
            priority: Some(Priority::High),
            ..NewTask::new("second")
        })
        .unwrap();
    ctx.workspace
        .create_task(NewTask {
            tags: Some("apis".to_string()),
            ..NewTask::new("third")
        })
        .unwrap();

    let all = ctx
        .workspace
        .list_tasks(&TaskFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(all.total_count, 3);
    assert_eq!(all.items[1].id, second.id);
    assert_eq!(all.items[2].id, first.id);

    let api = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                tags: Some("API".to_string()),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(api.total_count, 2);

    let both = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                tags: Some("api,backend".to_string()),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(both.items.len(), 1);
    assert_eq!(both.items[0].id, first.id);

    let high = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                priority: Some("high".to_string()),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(high.total_count, 1);

    let unknown = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                status: Some("archived".to_string()),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(unknown.total_count, 0);
    assert!(unknown.items.is_empty());
}

#[test]
fn test_list_include_deleted() {
    let ctx = TestContext::new();
    let task = ctx.task("soon gone");
    ctx.task("stays");
    ctx.workspace.delete_task(task.id, false).unwrap();

    let live = ctx
        .workspace
        .list_tasks(&TaskFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(live.total_count, 1);

    let everything = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                include_deleted: true,
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(everything.total_count, 2);
    assert!(everything.items.iter().any(|t| t.deleted_at.is_some()));
}

#[test]
fn test_pagination_bounds_and_coverage() {
    let ctx = TestContext::new();
    for i in 0..5 {
        ctx.task(&format!("task {i}"));
    }

    assert!(matches!(
        Pagination::new(0, 0),
        Err(Error::Pagination { field: "limit", .. })
    ));

    let past_end = ctx
        .workspace
        .list_tasks(&TaskFilter::default(), Pagination::new(10, 10_000).unwrap())
        .unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total_count, 5);

    let mut seen = HashSet::new();
    let mut offset = 0;
    loop {
        let page = ctx
            .workspace
            .list_tasks(&TaskFilter::default(), Pagination::new(2, offset).unwrap())
            .unwrap();
        for task in &page.items {
            assert!(seen.insert(task.id), "task {} visited twice", task.id);
        }
        if !page.has_more {
            break;
        }
        offset += 2;
    }
    assert_eq!(seen.len(), 5);
}

#[test]
fn test_search_matches_title_and_description() {
    let ctx = TestContext::new();
    let by_title = ctx.task("Fix LOGIN redirect");
    let by_description = ctx
        .workspace
        .create_task(NewTask {
            description: Some("the login form double-submits".to_string()),
            ..NewTask::new("Form bug")
        })
        .unwrap();
    ctx.task("Unrelated");
    ctx.task("100% coverage");

    let page = ctx
        .workspace
        .search_tasks("login", Pagination::default())
        .unwrap();
    let ids: HashSet<i64> = page.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, HashSet::from([by_title.id, by_description.id]));

    let literal = ctx
        .workspace
        .search_tasks("0%", Pagination::default())
        .unwrap();
    assert_eq!(literal.total_count, 1);

    let underscore = ctx
        .workspace
        .search_tasks("_", Pagination::default())
        .unwrap();
    assert_eq!(underscore.total_count, 0);
}

#[test]
fn test_search_folds_non_ascii_case() {
    let ctx = TestContext::new();
    let task = ctx.task("École migration");
    ctx.task("Ecole without accent");

    for term in ["École", "école", "ÉCOLE", "MIGRATION"] {
        let page = ctx
            .workspace
            .search_tasks(term, Pagination::default())
            .unwrap();
        assert_eq!(page.total_count, 1, "term {term:?}");
        assert_eq!(page.items[0].id, task.id);
    }
}

#[test]
fn test_tag_filter_matches_non_ascii_tags() {
    let ctx = TestContext::new();
    let tagged = ctx
        .workspace
        .create_task(NewTask {
            tags: Some("Übersetzung docs".to_string()),
            ..NewTask::new("translate")
        })
        .unwrap();
    ctx.task("untagged");

    let page = ctx
        .workspace
        .list_tasks(
            &TaskFilter {
                tags: Some("ÜBERSETZUNG".to_string()),
                ..TaskFilter::default()
            },
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].id, tagged.id);
}

#[test]
fn test_summary_rendering_hides_detail_fields() {
    let ctx = TestContext::new();
    ctx.workspace
        .create_task(NewTask {
            description: Some("long text".to_string()),
            ..NewTask::new("render me")
        })
        .unwrap();

    let page = ctx
        .workspace
        .list_tasks(&TaskFilter::default(), Pagination::default())
        .unwrap();

    let summary = serde_json::to_value(page.clone().render(Mode::Summary)).unwrap();
    assert!(summary["items"][0].get("description").is_none());
    assert_eq!(summary["items"][0]["title"], "render me");

    let details = serde_json::to_value(page.render(Mode::Details)).unwrap();
    assert_eq!(details["items"][0]["description"], "long text");
    assert_eq!(details["total_count"], 1);
}
