//! 记忆层：对话消息、历史裁剪、按 thread 的检查点（内存 / SQLite）

pub mod checkpoint;
pub mod conversation;
pub mod persistence;
pub mod trimmer;

pub use checkpoint::{CheckpointError, Checkpointer, MemoryCheckpointer};
pub use conversation::{Message, Role, ToolCallRequest};
pub use persistence::SqliteCheckpointer;
pub use trimmer::{HistoryTrimmer, RemoveMessage};
