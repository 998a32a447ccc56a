//! Small helpers shared by the transport and the command-line front-end.

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
