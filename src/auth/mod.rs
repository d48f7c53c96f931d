pub mod dtos;
pub mod middleware;

pub use dtos::ErrorResponse;
pub use middleware::{ApiKeyAuth, AuthError};
