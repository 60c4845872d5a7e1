//! 快照值类型：Snapshot、SnapshotHistory、FileChange
//!
//! Snapshot 只是一个内容寻址的树标识加时间戳，复制代价与指针相当；创建后不可变。

use serde::{Deserialize, Serialize};

/// 某一时刻整个工作目录树的不可变标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tree_hash: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Snapshot {
    pub fn new(tree_hash: impl Into<String>, description: Option<String>) -> Self {
        Self {
            tree_hash: tree_hash.into(),
            timestamp_ms: now_ms(),
            description,
        }
    }

    /// 降级快照：捕获失败时的占位记录，树标识为空
    pub fn placeholder(note: impl Into<String>) -> Self {
        Self {
            tree_hash: String::new(),
            timestamp_ms: now_ms(),
            description: Some(note.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.tree_hash.is_empty()
    }

    /// 结构相等：同一棵树，与捕获时间无关
    pub fn same_tree(&self, other: &Snapshot) -> bool {
        !self.is_degraded() && self.tree_hash == other.tree_hash
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 可以定位一棵树的值：Snapshot 或裸的树哈希
pub trait TreeId {
    fn tree_hash(&self) -> &str;
}

impl TreeId for Snapshot {
    fn tree_hash(&self) -> &str {
        &self.tree_hash
    }
}

impl TreeId for str {
    fn tree_hash(&self) -> &str {
        self
    }
}

impl TreeId for String {
    fn tree_hash(&self) -> &str {
        self
    }
}

/// 仅追加的快照序列，时间戳单调不减
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotHistory {
    entries: Vec<Snapshot>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加快照；若时钟回拨则把时间戳钳到上一条，保证单调
    pub fn push(&mut self, mut snapshot: Snapshot) -> &Snapshot {
        if let Some(last) = self.entries.last() {
            if snapshot.timestamp_ms < last.timestamp_ms {
                snapshot.timestamp_ms = last.timestamp_ms;
            }
        }
        self.entries.push(snapshot);
        &self.entries[self.entries.len() - 1]
    }

    pub fn contains(&self, snapshot: &Snapshot) -> bool {
        self.entries.iter().any(|s| s == snapshot)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 树中的一个文件：相对路径 + 内容哈希
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry {
    pub path: String,
    pub object: String,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            object: object.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
