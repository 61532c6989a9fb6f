//! Read and write halves of a WebSocket connection.

pub(crate) mod read;
pub(crate) mod write;
