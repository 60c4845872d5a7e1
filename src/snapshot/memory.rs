//! 进程内对象库后端
//!
//! 不依赖 git：capture 遍历工作目录（跳过 .git），按内容 SHA-256 存 blob，
//! 树标识为「有序 (路径, blob)」列表的哈希。相同内容的目录得到相同树标识。

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::core::SnapshotError;
use crate::snapshot::{TreeBackend, TreeEntry};

#[derive(Debug, Default)]
pub struct MemoryTreeBackend {
    trees: RwLock<HashMap<String, Vec<TreeEntry>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryTreeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn blob_id(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn tree_id(entries: &[TreeEntry]) -> String {
    let mut hasher = Sha256::new();
    for e in entries {
        hasher.update(e.path.as_bytes());
        hasher.update([0]);
        hasher.update(e.object.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

/// 读取目录下所有普通文件：(相对路径, 内容)
fn scan(dir: &Path) -> Result<Vec<(String, Vec<u8>)>, SnapshotError> {
    if !dir.is_dir() {
        return Err(SnapshotError::NotVersioned(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| SnapshotError::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, std::fs::read(entry.path())?));
    }
    Ok(files)
}

#[async_trait]
impl TreeBackend for MemoryTreeBackend {
    async fn capture_tree(&self, dir: &Path) -> Result<String, SnapshotError> {
        let dir = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || scan(&dir))
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))??;

        let mut entries = Vec::with_capacity(files.len());
        {
            let mut blobs = self.blobs.write().await;
            for (path, content) in files {
                let object = blob_id(&content);
                blobs.entry(object.clone()).or_insert(content);
                entries.push(TreeEntry::new(path, object));
            }
        }
        entries.sort();
        let tree = tree_id(&entries);
        self.trees.write().await.entry(tree.clone()).or_insert(entries);
        Ok(tree)
    }

    async fn has_tree(&self, _dir: &Path, tree: &str) -> Result<bool, SnapshotError> {
        Ok(self.trees.read().await.contains_key(tree))
    }

    async fn list_tree(&self, _dir: &Path, tree: &str) -> Result<Vec<TreeEntry>, SnapshotError> {
        self.trees
            .read()
            .await
            .get(tree)
            .cloned()
            .ok_or_else(|| SnapshotError::UnknownTree(tree.to_string()))
    }

    async fn read_blob(&self, _dir: &Path, object: &str) -> Result<Vec<u8>, SnapshotError> {
        self.blobs
            .read()
            .await
            .get(object)
            .cloned()
            .ok_or_else(|| SnapshotError::Io(format!("missing blob {object}")))
    }

    async fn checkout_tree(
        &self,
        dir: &Path,
        tree: &str,
        remove: &[String],
    ) -> Result<(), SnapshotError> {
        let entries = self.list_tree(dir, tree).await?;
        for path in remove {
            match tokio::fs::remove_file(dir.join(path)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        for entry in entries {
            let content = self.read_blob(dir, &entry.object).await?;
            let target = dir.join(&entry.path);
            clear_conflicts(dir, &entry.path).await?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }
        Ok(())
    }
}

/// 让出目标文件的位置：祖先路径上的普通文件删除，目标处的目录整体删除
async fn clear_conflicts(dir: &Path, rel: &str) -> Result<(), SnapshotError> {
    let mut current = dir.to_path_buf();
    let parts: Vec<&str> = rel.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        current.push(part);
        let meta = match tokio::fs::symlink_metadata(&current).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let is_target = i + 1 == parts.len();
        if is_target && meta.is_dir() {
            tokio::fs::remove_dir_all(&current).await?;
        } else if !is_target && !meta.is_dir() {
            tokio::fs::remove_file(&current).await?;
            return Ok(());
        }
    }
    Ok(())
}
