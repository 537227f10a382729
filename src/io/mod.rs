//! I/O: resource info queries and pipeline document persistence.

mod document_writer;
mod resource;

pub use document_writer::{DocumentWriter, WrittenDocument};
pub use resource::{read_url, HttpResource, InfoSource, ResourceInfo};
