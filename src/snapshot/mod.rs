//! 快照层：内容寻址的工作目录历史（值类型、存储语义、Git / 内存后端）

pub mod git;
pub mod memory;
pub mod store;
pub mod types;

pub use git::{CaptureMode, GitTreeBackend};
pub use memory::MemoryTreeBackend;
pub use store::{diff_entries, SnapshotStore, TreeBackend};
pub use types::{ChangeKind, FileChange, Snapshot, SnapshotHistory, TreeEntry, TreeId};
