//! Server-Sent Events line discipline: a synchronous scanner that turns a
//! byte stream into framed events without owning the stream itself.

mod framer;

pub use framer::{SseEvent, SseFramer};
