pub mod phone_validation;
pub use phone_validation::validate_phone_number;
pub mod url_validation;
pub use url_validation::{UrlValidationError, http_url, validate_public_url, websocket_url};
