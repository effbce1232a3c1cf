mod metadata;
mod models;
mod page;
mod status;

pub use metadata::Metadata;
pub use models::*;
pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, Pagination, Rendered, Summarize};
pub use status::{EntityType, Mode, Priority, TaskStatus};
