//! 快照存储
//!
//! SnapshotStore 把工作目录表示为不可变、内容寻址的值：capture / restore / diff / read_file。
//! 具体对象库由 TreeBackend 提供（Git 或进程内存），存储只负责语义：
//! diff 在两棵树的有序文件列表上同步遍历；restore 先删掉目标树中不存在的文件再检出。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::SnapshotError;
use crate::snapshot::{ChangeKind, FileChange, Snapshot, TreeEntry, TreeId};

/// 内容寻址树对象库：以工作目录路径为键提供捕获 / 检出 / 列举 / 读取原语
#[async_trait]
pub trait TreeBackend: Send + Sync {
    /// 记录工作目录当前状态，返回树标识
    async fn capture_tree(&self, dir: &Path) -> Result<String, SnapshotError>;

    async fn has_tree(&self, dir: &Path, tree: &str) -> Result<bool, SnapshotError>;

    /// 列出树中所有文件（递归），顺序不作要求
    async fn list_tree(&self, dir: &Path, tree: &str) -> Result<Vec<TreeEntry>, SnapshotError>;

    async fn read_blob(&self, dir: &Path, object: &str) -> Result<Vec<u8>, SnapshotError>;

    /// 删除 `remove` 中的文件，然后把树中所有文件强制写回工作目录
    async fn checkout_tree(
        &self,
        dir: &Path,
        tree: &str,
        remove: &[String],
    ) -> Result<(), SnapshotError>;

    /// 在树中查找单个路径；默认实现走 list_tree
    async fn lookup(
        &self,
        dir: &Path,
        tree: &str,
        path: &str,
    ) -> Result<Option<TreeEntry>, SnapshotError> {
        Ok(self
            .list_tree(dir, tree)
            .await?
            .into_iter()
            .find(|e| e.path == path))
    }
}

/// 绑定到单个工作目录的快照存储
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn TreeBackend>,
    working_directory: PathBuf,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("working_directory", &self.working_directory)
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn TreeBackend>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            working_directory: working_directory.into(),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub async fn capture(&self, description: Option<&str>) -> Result<Snapshot, SnapshotError> {
        let tree = self.backend.capture_tree(&self.working_directory).await?;
        tracing::debug!(tree = %tree, description = ?description, "snapshot captured");
        Ok(Snapshot::new(tree, description.map(str::to_string)))
    }

    /// 将工作目录强制重置为目标树；目标树未覆盖的本地改动会被丢弃
    pub async fn restore<T: TreeId + ?Sized>(&self, target: &T) -> Result<(), SnapshotError> {
        let tree = self.known_tree(target.tree_hash()).await?;

        let current = self.backend.capture_tree(&self.working_directory).await?;
        let remove: Vec<String> = if current == tree {
            Vec::new()
        } else {
            let from = self.sorted_entries(&tree).await?;
            let to = self.sorted_entries(&current).await?;
            diff_entries(&from, &to)
                .into_iter()
                .filter(|c| c.kind == ChangeKind::Added)
                .map(|c| c.path)
                .collect()
        };

        self.backend
            .checkout_tree(&self.working_directory, &tree, &remove)
            .await?;
        tracing::info!(tree = %tree, removed = remove.len(), "snapshot restored");
        Ok(())
    }

    /// 两棵树的结构比较：仅在 to 中为 added，仅在 from 中为 deleted，内容哈希不同为 modified
    pub async fn diff(
        &self,
        from: &Snapshot,
        to: &Snapshot,
    ) -> Result<Vec<FileChange>, SnapshotError> {
        for s in [from, to] {
            if s.is_degraded() {
                return Err(SnapshotError::Degraded(
                    s.description.clone().unwrap_or_default(),
                ));
            }
            self.known_tree(&s.tree_hash).await?;
        }
        if from.tree_hash == to.tree_hash {
            return Ok(Vec::new());
        }
        let from_entries = self.sorted_entries(&from.tree_hash).await?;
        let to_entries = self.sorted_entries(&to.tree_hash).await?;
        Ok(diff_entries(&from_entries, &to_entries))
    }

    /// 读取快照中某个文件的历史内容，与当前工作目录状态无关
    pub async fn read_file<T: TreeId + ?Sized>(
        &self,
        snapshot: &T,
        path: &str,
    ) -> Result<Vec<u8>, SnapshotError> {
        let tree = self.known_tree(snapshot.tree_hash()).await?;
        let path = normalize_path(path);
        let entry = self
            .backend
            .lookup(&self.working_directory, &tree, &path)
            .await?
            .ok_or_else(|| SnapshotError::PathNotFound {
                tree: tree.clone(),
                path: path.clone(),
            })?;
        self.backend
            .read_blob(&self.working_directory, &entry.object)
            .await
    }

    async fn known_tree(&self, tree: &str) -> Result<String, SnapshotError> {
        if tree.is_empty() {
            return Err(SnapshotError::Degraded("empty tree identifier".to_string()));
        }
        if !self.backend.has_tree(&self.working_directory, tree).await? {
            return Err(SnapshotError::UnknownTree(tree.to_string()));
        }
        Ok(tree.to_string())
    }

    async fn sorted_entries(&self, tree: &str) -> Result<Vec<TreeEntry>, SnapshotError> {
        let mut entries = self.backend.list_tree(&self.working_directory, tree).await?;
        entries.sort();
        Ok(entries)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    trimmed.replace('\\', "/")
}

/// 在两个按路径排序的列表上同步遍历
pub fn diff_entries(from: &[TreeEntry], to: &[TreeEntry]) -> Vec<FileChange> {
    use std::cmp::Ordering;

    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < from.len() && j < to.len() {
        let (a, b) = (&from[i], &to[j]);
        match a.path.cmp(&b.path) {
            Ordering::Less => {
                changes.push(FileChange::new(a.path.clone(), ChangeKind::Deleted));
                i += 1;
            }
            Ordering::Greater => {
                changes.push(FileChange::new(b.path.clone(), ChangeKind::Added));
                j += 1;
            }
            Ordering::Equal => {
                if a.object != b.object {
                    changes.push(FileChange::new(a.path.clone(), ChangeKind::Modified));
                }
                i += 1;
                j += 1;
            }
        }
    }
    changes.extend(
        from[i..]
            .iter()
            .map(|e| FileChange::new(e.path.clone(), ChangeKind::Deleted)),
    );
    changes.extend(
        to[j..]
            .iter()
            .map(|e| FileChange::new(e.path.clone(), ChangeKind::Added)),
    );
    changes
}
