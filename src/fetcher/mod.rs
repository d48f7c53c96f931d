pub mod client;
pub mod decode;
pub mod errors;
pub mod guard;
pub mod types;

pub use client::{BROWSER_USER_AGENT, HttpFetcher};
pub use errors::FetchError;
pub use guard::{AddressPolicy, BlockedHost};
pub use types::{Charset, PageResponse};
