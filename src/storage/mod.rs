pub mod codec;
pub mod offset_store;
pub mod topic_log;

// Re-exports for ergonomics
pub use offset_store::OffsetStore;
pub use topic_log::{fnv1a_64, TopicLog};
