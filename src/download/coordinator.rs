//! 下载调度：把任务分给固定数量的工作线程，逐个执行“跳过或下载”。

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info};

use super::models::{DownloadOutcome, DownloadTask};
use super::pool::run_pool;
use super::progress::ProgressReporter;
use crate::openlist::ApiError;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;
pub const DEFAULT_WORKERS: usize = 10;

/// 按直链取回文件内容的能力。实现需可跨线程共享。
pub trait Fetcher: Sync {
    fn fetch(&self, raw_url: &str) -> Result<Box<dyn Read + '_>, ApiError>;
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    Fetch(#[from] ApiError),
    #[error("写入 {path} 失败: {source}")]
    Io { path: String, source: io::Error },
    #[error("大小不一致：期望 {expected} 字节，实际 {actual} 字节")]
    SizeMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub workers: usize,
    pub skip_existing: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            skip_existing: true,
        }
    }
}

/// 执行全部任务，返回与 `tasks` 一一对应的结果。单个任务失败不影响其他任务。
pub fn run<F: Fetcher + ?Sized>(
    fetcher: &F,
    tasks: &[DownloadTask],
    options: DownloadOptions,
    progress: &mut ProgressReporter,
) -> Vec<DownloadOutcome> {
    info!(target: "download", "总文件数：{}，使用 {} 个下载线程", tasks.len(), options.workers.max(1));

    let outcomes = run_pool(
        tasks,
        options.workers,
        |task| process_task(fetcher, task, options.skip_existing),
        |task, outcome| {
            log_outcome(task, outcome);
            progress.inc();
        },
    );
    debug_assert_eq!(progress.done(), tasks.len());
    progress.finish();
    outcomes
}

fn process_task<F: Fetcher + ?Sized>(
    fetcher: &F,
    task: &DownloadTask,
    skip_existing: bool,
) -> DownloadOutcome {
    if skip_existing && already_present(&task.target, task.expected_size) {
        return DownloadOutcome::Skipped;
    }
    match download_one(fetcher, task) {
        Ok(bytes) => DownloadOutcome::Completed { bytes },
        Err(err) => DownloadOutcome::Failed(err.to_string()),
    }
}

fn already_present(target: &Path, expected: u64) -> bool {
    fs::metadata(target)
        .map(|m| m.is_file() && m.len() == expected)
        .unwrap_or(false)
}

/// 目录创建 → 流式写入 → 大小校验。
fn download_one<F: Fetcher + ?Sized>(fetcher: &F, task: &DownloadTask) -> Result<u64, DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: task.target.display().to_string(),
        source,
    };

    if let Some(parent) = task.target.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    debug!(target: "download", "开始下载 {} -> {}", task.remote_path, task.target.display());
    let mut reader = fetcher.fetch(&task.raw_url)?;

    let file = File::create(&task.target).map_err(io_err)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let written = io::copy(&mut reader, &mut writer).map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    if written != task.expected_size {
        return Err(DownloadError::SizeMismatch {
            expected: task.expected_size,
            actual: written,
        });
    }
    Ok(written)
}

fn log_outcome(task: &DownloadTask, outcome: &DownloadOutcome) {
    match outcome {
        DownloadOutcome::Skipped => {
            info!(target: "download", "已存在，跳过：{}", task.target.display())
        }
        DownloadOutcome::Completed { bytes } => {
            info!(target: "download", bytes, "已保存：{}", task.target.display())
        }
        DownloadOutcome::Failed(reason) => {
            error!(target: "download", "下载失败 {}: {}", task.remote_path, reason)
        }
    }
}
