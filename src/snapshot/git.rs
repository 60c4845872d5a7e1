//! Git 对象库后端
//!
//! 所有操作都通过 `git` 子进程完成。捕获与检出使用临时索引文件（GIT_INDEX_FILE），
//! 不触碰用户自己的暂存区。工作目录可以是仓库的子目录：此时树是该子目录对应的子树。

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::core::SnapshotError;
use crate::snapshot::{TreeBackend, TreeEntry};

/// 捕获方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// 通过临时索引暂存整个工作树再 write-tree，能观察到未提交的改动
    #[default]
    Worktree,
    /// 只读取当前 HEAD 提交的树，不做任何暂存
    Head,
}

#[derive(Debug, Clone, Default)]
pub struct GitTreeBackend {
    mode: CaptureMode,
}

impl GitTreeBackend {
    pub fn new(mode: CaptureMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    async fn git<I, S>(
        &self,
        dir: &Path,
        args: I,
        index: Option<&Path>,
    ) -> Result<Vec<u8>, SnapshotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir);
        cmd.env("LC_ALL", "C");
        cmd.args(["--no-pager", "-c", "color.ui=never"]);
        cmd.args(args);
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| SnapshotError::Git(format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SnapshotError::Git(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    async fn git_text<I, S>(&self, dir: &Path, args: I) -> Result<String, SnapshotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.git(dir, args, None).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// 工作目录相对仓库根的前缀（如 "sub/"；仓库根为空串）；不在仓库中时返回 NotVersioned
    async fn prefix(&self, dir: &Path) -> Result<String, SnapshotError> {
        if !dir.is_dir() {
            return Err(SnapshotError::NotVersioned(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        self.git_text(dir, ["rev-parse", "--show-prefix"])
            .await
            .map_err(|e| SnapshotError::NotVersioned(format!("{}: {e}", dir.display())))
    }

    fn scratch_index() -> Result<(tempfile::TempDir, PathBuf), SnapshotError> {
        let scratch = tempfile::Builder::new().prefix("drone-index").tempdir()?;
        let index = scratch.path().join("index");
        Ok((scratch, index))
    }
}

fn is_object_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// 解析 `git ls-tree -r -z` 输出：`<mode> <type> <object>\t<path>\0`
fn parse_ls_tree(raw: &[u8]) -> Vec<TreeEntry> {
    raw.split(|b| *b == 0)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split(' ');
            let _mode = fields.next()?;
            let kind = fields.next()?;
            let object = fields.next()?;
            (kind == "blob").then(|| TreeEntry::new(path, object))
        })
        .collect()
}

#[async_trait]
impl TreeBackend for GitTreeBackend {
    async fn capture_tree(&self, dir: &Path) -> Result<String, SnapshotError> {
        let prefix = self.prefix(dir).await?;
        match self.mode {
            CaptureMode::Head => {
                let spec = if prefix.is_empty() {
                    "HEAD^{tree}".to_string()
                } else {
                    format!("HEAD:{}", prefix.trim_end_matches('/'))
                };
                self.git_text(dir, ["rev-parse", "--verify", spec.as_str()])
                    .await
                    .map_err(|e| SnapshotError::NotVersioned(format!("no recorded state: {e}")))
            }
            CaptureMode::Worktree => {
                let (_scratch, index) = Self::scratch_index()?;
                self.git(dir, ["add", "-A", "--", "."], Some(&index)).await?;
                let mut args = vec!["write-tree".to_string()];
                if !prefix.is_empty() {
                    args.push(format!("--prefix={prefix}"));
                }
                let out = self.git(dir, &args, Some(&index)).await?;
                let tree = String::from_utf8_lossy(&out).trim().to_string();
                if tree.is_empty() {
                    return Err(SnapshotError::Git("write-tree returned nothing".to_string()));
                }
                Ok(tree)
            }
        }
    }

    async fn has_tree(&self, dir: &Path, tree: &str) -> Result<bool, SnapshotError> {
        if !is_object_id(tree) {
            return Ok(false);
        }
        match self.git_text(dir, ["cat-file", "-t", tree]).await {
            Ok(kind) => Ok(kind == "tree"),
            Err(_) => Ok(false),
        }
    }

    async fn list_tree(&self, dir: &Path, tree: &str) -> Result<Vec<TreeEntry>, SnapshotError> {
        if !is_object_id(tree) {
            return Err(SnapshotError::UnknownTree(tree.to_string()));
        }
        let out = self
            .git(dir, ["ls-tree", "-r", "-z", "--full-tree", tree], None)
            .await?;
        Ok(parse_ls_tree(&out))
    }

    async fn read_blob(&self, dir: &Path, object: &str) -> Result<Vec<u8>, SnapshotError> {
        if !is_object_id(object) {
            return Err(SnapshotError::Git(format!("invalid object id: {object}")));
        }
        self.git(dir, ["cat-file", "blob", object], None).await
    }

    async fn checkout_tree(
        &self,
        dir: &Path,
        tree: &str,
        remove: &[String],
    ) -> Result<(), SnapshotError> {
        let prefix = self.prefix(dir).await?;
        for path in remove {
            match tokio::fs::remove_file(dir.join(path)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let (_scratch, index) = Self::scratch_index()?;
        let mut read_args = vec!["read-tree".to_string()];
        if !prefix.is_empty() {
            read_args.push(format!("--prefix={prefix}"));
        }
        read_args.push(tree.to_string());
        self.git(dir, &read_args, Some(&index)).await?;
        self.git(dir, ["checkout-index", "-a", "-f"], Some(&index))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_tree_keeps_blobs_only() {
        let raw = b"100644 blob aaaa\ta.txt\0160000 commit bbbb\tvendor/sub\0100755 blob cccc\tbin/run sh\0";
        let entries = parse_ls_tree(raw);
        assert_eq!(
            entries,
            vec![TreeEntry::new("a.txt", "aaaa"), TreeEntry::new("bin/run sh", "cccc")]
        );
    }

    #[test]
    fn test_object_id_validation() {
        assert!(is_object_id("4b825dc642cb6eb9a060e54bf8d69288fbee4904"));
        assert!(!is_object_id(""));
        assert!(!is_object_id("--all"));
        assert!(!is_object_id("HEAD"));
    }
}
