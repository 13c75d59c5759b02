//! Content filtering and identity hygiene.

pub mod content_filter;
pub mod reputation;
pub mod username;

pub use content_filter::ContentFilter;
pub use reputation::{AllowAll, ReputationChecker};
pub use username::{is_generated, parse_username};
