//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（RemoteEntry / DownloadTask / DownloadOutcome 等）
//! - `walker`：远程目录递归遍历
//! - `inventory`：文件清单的保存与读取
//! - `pool`：固定大小的并发工作池
//! - `coordinator`：下载调度（跳过已存在 / 流式写入 / 大小校验）
//! - `progress`：进度上报与 CLI 进度条

pub mod coordinator;
pub mod inventory;
pub mod models;
pub(crate) mod pool;
pub mod progress;
pub mod walker;
