pub mod csv_import;
pub mod db;
pub mod dedupe;
pub mod embedder;
pub mod embeddings;
pub mod memory;
pub mod store;
pub mod upsert;

pub use db::PgStore;
pub use memory::MemoryStore;
pub use store::{EmbeddingStore, RecordStore};
