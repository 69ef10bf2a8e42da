//! Typed records used across layers.

pub mod message;
pub mod request;
pub mod response;
