pub mod engine;
pub mod error;
pub mod host;
pub mod matcher;
pub mod motif;
pub mod pipeline;
pub mod query;

pub use engine::GrandCypher;
pub use error::EngineError;
pub use host::{HostGraph, MemoryGraph};
pub use matcher::{EdgeBinding, EdgeInstance, Embedding, Hint};
pub use pipeline::ColumnarTable;
