//! Response bodies.

pub mod error_response;
pub mod search_result;

pub use error_response::{ErrorItem, ErrorResponse};
pub use search_result::{SearchResult, SearchResultItem};
