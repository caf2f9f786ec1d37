//! API response envelope types

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
