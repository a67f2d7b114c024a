//! 下载相关的数据模型定义。
//!
//! 包含远程条目、下载任务、单任务结果与汇总统计。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 远程列表中的一个条目。清单中只保存文件条目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(default)]
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub raw_url: String,
}

impl RemoteEntry {
    pub fn file(path: &str, size: u64, raw_url: &str) -> Self {
        Self {
            name: file_name(path).to_string(),
            path: path.to_string(),
            is_dir: false,
            size,
            raw_url: raw_url.to_string(),
        }
    }

    pub fn dir(path: &str) -> Self {
        Self {
            name: file_name(path).to_string(),
            path: path.to_string(),
            is_dir: true,
            size: 0,
            raw_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub remote_path: String,
    pub raw_url: String,
    pub target: PathBuf,
    pub expected_size: u64,
}

impl DownloadTask {
    pub fn from_entry(entry: &RemoteEntry, remote_root: &str, save_dir: &Path) -> Self {
        Self {
            remote_path: entry.path.clone(),
            raw_url: entry.raw_url.clone(),
            target: local_target(&entry.path, remote_root, save_dir),
            expected_size: entry.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Skipped,
    Completed { bytes: u64 },
    Failed(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub total: usize,
    pub skipped: usize,
    pub completed: usize,
    pub failed: usize,
}

impl DownloadSummary {
    pub fn from_outcomes(outcomes: &[DownloadOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                DownloadOutcome::Skipped => summary.skipped += 1,
                DownloadOutcome::Completed { .. } => summary.completed += 1,
                DownloadOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// 拼接远程子路径：`/a/` + `b` → `/a/b`。
pub fn join_remote(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// 把远程路径映射到本地：以 `save_dir` 替换 `remote_root` 前缀。
///
/// 不在 `remote_root` 之下的路径按完整远程路径放到 `save_dir` 下。
/// 空段、`.` 与 `..` 会被丢弃，结果始终位于 `save_dir` 内。
pub fn local_target(remote_path: &str, remote_root: &str, save_dir: &Path) -> PathBuf {
    let root = remote_root.trim_end_matches('/');
    let relative = match remote_path.strip_prefix(root) {
        Some(rest) if !root.is_empty() && rest.starts_with('/') => rest,
        _ => remote_path,
    };

    let mut target = save_dir.to_path_buf();
    let mut pushed = false;
    for part in relative
        .split('/')
        .filter(|p| !p.is_empty() && *p != "." && *p != "..")
    {
        target.push(part);
        pushed = true;
    }
    if !pushed {
        target.push(file_name(remote_path));
    }
    target
}
