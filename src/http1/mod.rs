//! Reference HTTP/1.x consumer: a minimal request/response cycle built on
//! top of [`crate::consumer::Consumer`], useful on its own and as the
//! upgrade origin for [`crate::ws`].
pub mod consumer;
pub mod message;
pub mod parser;

pub use consumer::{Handler, Http1Consumer};
pub use message::{Method, Request, Response, Version};
pub use parser::{Parsed, RequestParser};
