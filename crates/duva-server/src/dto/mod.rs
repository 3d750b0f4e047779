//! Data Transfer Objects for API requests and responses.

mod request;
mod response;

pub use request::*;
pub use response::*;
