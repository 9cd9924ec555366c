//! Type definitions

pub mod messages;
pub mod request;
pub mod route;

pub use messages::*;
pub use request::*;
pub use route::*;
