use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Paging and verbosity shared by list and search commands
#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    /// Maximum rows to return (1-1000)
    #[arg(long)]
    pub limit: Option<i64>,

    /// Rows to skip
    #[arg(long)]
    pub offset: Option<i64>,

    /// Row verbosity: summary or details
    #[arg(long)]
    pub mode: Option<String>,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// todo, in_progress, blocked, done or cancelled
        #[arg(long)]
        status: Option<String>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,

        /// Parent task ID
        #[arg(long)]
        parent: Option<i64>,

        /// Task IDs that must be done first (comma separated)
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<i64>,

        /// Required when status is blocked
        #[arg(long)]
        blocker_reason: Option<String>,

        /// Tags, whitespace or comma separated
        #[arg(long)]
        tags: Option<String>,

        /// File reference (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Show a task
    Get { id: i64 },

    /// Update fields of a task. An empty string clears a text field.
    Update {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long, conflicts_with = "no_parent")]
        parent: Option<i64>,

        /// Detach from the parent task
        #[arg(long)]
        no_parent: bool,

        /// Replaces the dependency list (comma separated)
        #[arg(long, value_delimiter = ',', conflicts_with = "no_depends_on")]
        depends_on: Option<Vec<i64>>,

        /// Clear all dependencies
        #[arg(long)]
        no_depends_on: bool,

        #[arg(long)]
        blocker_reason: Option<String>,

        #[arg(long)]
        tags: Option<String>,

        /// Replaces the file references (repeatable)
        #[arg(long = "file")]
        files: Option<Vec<String>>,
    },

    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        parent: Option<i64>,

        /// Only tasks carrying every listed tag
        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        include_deleted: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Search task titles and descriptions
    Search {
        term: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Soft-delete a task
    Delete {
        id: i64,

        /// Also delete every subtask and their links
        #[arg(long)]
        cascade: bool,
    },

    /// Show a task with its subtasks
    Tree { id: i64 },

    /// List blocked tasks
    Blocked,

    /// List tasks ready to start
    Next,

    /// List entities linked to a task
    Entities {
        id: i64,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Create an entity
    Create {
        /// file or other
        #[arg(long = "type")]
        entity_type: String,

        #[arg(long)]
        name: String,

        /// Unique per type among live entities
        #[arg(long)]
        identifier: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Opaque payload, stored as given
        #[arg(long)]
        metadata: Option<String>,

        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Show an entity
    Get { id: i64 },

    /// Update fields of an entity. An empty string clears a text field.
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        identifier: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        metadata: Option<String>,

        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        updated_by: Option<String>,
    },

    /// List entities
    List {
        #[arg(long = "type")]
        entity_type: Option<String>,

        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        include_deleted: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Search entity names and identifiers
    Search {
        term: String,

        #[arg(long = "type")]
        entity_type: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Soft-delete an entity and its links
    Delete { id: i64 },

    /// Link an entity to a task
    Link {
        task_id: i64,
        entity_id: i64,

        #[arg(long)]
        created_by: Option<String>,
    },

    /// Remove the link between an entity and a task
    Unlink { task_id: i64, entity_id: i64 },

    /// List tasks linked to an entity
    Tasks {
        id: i64,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// List known workspaces, most recently used first
    List,

    /// Show the registry entry of a workspace
    Show {
        /// Defaults to the current workspace
        path: Option<PathBuf>,
    },

    /// Set or clear (empty name) a workspace's friendly name
    Name {
        name: String,

        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Remove a workspace from the registry; its data is kept
    Forget { path: Option<PathBuf> },
}
