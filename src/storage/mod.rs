//! Storage backends implementing the `Source` boundary

mod in_memory;

pub use in_memory::InMemorySource;
