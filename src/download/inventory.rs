//! 文件清单（filelist.json）的保存与读取。
//!
//! 清单是“仅列出”与“仅下载”两次运行之间的交换格式。

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::models::RemoteEntry;

pub const DEFAULT_FILE_NAME: &str = "filelist.json";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("未找到 {}，请先使用 --list-only 运行", .path.display())]
    NotFound { path: PathBuf },
    #[error("读写 {} 失败: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{} 不是有效的 JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{} 中的记录无效: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// 先写同目录临时文件再原子替换，中途崩溃不会留下半份清单。
pub fn save(entries: &[RemoteEntry], path: &Path) -> Result<(), InventoryError> {
    let io_err = |source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(entries).map_err(|source| InventoryError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    info!(target: "inventory", "文件列表已保存到 {}（{} 个文件）", path.display(), entries.len());
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<RemoteEntry>, InventoryError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            InventoryError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            InventoryError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let entries: Vec<RemoteEntry> =
        serde_json::from_str(&raw).map_err(|source| InventoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    validate(&entries).map_err(|reason| InventoryError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    info!(target: "inventory", "使用现有的 {}（{} 个文件）", path.display(), entries.len());
    Ok(entries)
}

fn validate(entries: &[RemoteEntry]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.path.trim().is_empty() {
            return Err("存在空的 path".to_string());
        }
        if entry.raw_url.trim().is_empty() {
            return Err(format!("'{}' 缺少 raw_url，请重新运行 --list-only", entry.path));
        }
        if !seen.insert(entry.path.as_str()) {
            return Err(format!("重复的 path '{}'", entry.path));
        }
    }
    Ok(())
}
