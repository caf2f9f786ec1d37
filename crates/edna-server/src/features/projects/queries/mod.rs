//! Read operations for projects

pub mod get;
pub mod list;
pub mod summary;

pub use get::{GetProjectError, GetProjectQuery};
pub use list::{ListProjectsError, ListProjectsQuery};
pub use summary::{GetSummaryError, GetSummaryQuery};
