//! Storage layer: a flat key-value store for run checkpoints and a sink for
//! finished artifacts.

mod artifact;
mod error;
pub mod keys;
mod kv;

pub use artifact::{ArtifactSink, DirSink, MemorySink};
pub use error::StoreError;
pub use kv::{DirStore, MemoryStore, StateStore, load_json, save_json};
