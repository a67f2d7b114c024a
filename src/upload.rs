//! 上传模式：把本地目录镜像到远程目录。
//!
//! 先顺序创建远程目录，再用与下载相同的工作池并发上传文件。

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::download::models::join_remote;
use crate::download::pool::run_pool;
use crate::download::progress::ProgressReporter;
use crate::openlist::ApiError;

/// 远程写入能力（建目录 / 上传）。
pub trait RemoteWriter: Sync {
    fn mkdir(&self, path: &str) -> Result<(), ApiError>;
    fn put_file(&self, local: &Path, remote: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("上传模式需要在配置文件中指定 upload.local_path 和 upload.remote_upload_path")]
    MissingConfig,
    #[error("本地上传目录不存在: {}", .0.display())]
    MissingLocalDir(PathBuf),
    #[error("读取本地目录 {path} 失败: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local: PathBuf,
    pub remote: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub total: usize,
    pub uploaded: usize,
    pub failed: usize,
}

impl UploadSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// 列出本地文件并映射到远程路径；结果按相对路径排序。
pub fn plan(local_root: &str, remote_root: &str) -> Result<Vec<UploadTask>, UploadError> {
    if local_root.trim().is_empty() || remote_root.trim().is_empty() {
        return Err(UploadError::MissingConfig);
    }
    let root = Path::new(local_root);
    if !root.is_dir() {
        return Err(UploadError::MissingLocalDir(root.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort_by(|a, b| a.1.cmp(&b.1));

    Ok(files
        .into_iter()
        .map(|(local, rel)| UploadTask {
            local,
            remote: join_remote(remote_root, &rel),
        })
        .collect())
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(PathBuf, String)>,
) -> Result<(), UploadError> {
    let io_err = |source| UploadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err)?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((path, rel));
        }
    }
    Ok(())
}

/// 需要预先创建的远程目录，父目录排在子目录之前。
fn remote_dirs(tasks: &[UploadTask]) -> BTreeSet<String> {
    tasks
        .iter()
        .filter_map(|t| t.remote.rsplit_once('/').map(|(dir, _)| dir.to_string()))
        .filter(|d| !d.is_empty())
        .collect()
}

pub fn run<W: RemoteWriter + ?Sized>(
    writer: &W,
    tasks: &[UploadTask],
    workers: usize,
    progress: &mut ProgressReporter,
) -> UploadSummary {
    for dir in remote_dirs(tasks) {
        if let Err(err) = writer.mkdir(&dir) {
            warn!(target: "upload", "创建目录失败 {}: {}", dir, err);
        }
    }

    info!(target: "upload", "总共 {} 个文件，使用 {} 个上传线程", tasks.len(), workers.max(1));
    let results = run_pool(
        tasks,
        workers,
        |task| writer.put_file(&task.local, &task.remote).map_err(|e| e.to_string()),
        |task, result| {
            match result {
                Ok(()) => info!(target: "upload", "已上传: {} -> {}", task.local.display(), task.remote),
                Err(reason) => error!(target: "upload", "上传失败 {}: {}", task.remote, reason),
            }
            progress.inc();
        },
    );
    progress.finish();

    let failed = results.iter().filter(|r| r.is_err()).count();
    UploadSummary {
        total: results.len(),
        uploaded: results.len() - failed,
        failed,
    }
}
