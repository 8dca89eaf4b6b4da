//! Small helpers shared by the renderer, config loader and publishers.
//!
//! - **Text**: description truncation, quote normalization, control
//!   character stripping, duration formatting
//! - **URLs**: validation of configured feed and API URLs
//! - **Files**: atomic owner-only writes for session files

mod fs;
mod text;
mod url_validator;

pub use fs::write_private_atomic;
pub use text::{format_duration, strip_control_chars, truncate_description, unsmart_quotes};
pub use url_validator::{validate_http_url, UrlValidationError};
