//! OpenList 服务端接口适配（登录 / 列目录 / 取文件 / 建目录 / 上传）。

pub mod client;
pub(crate) mod models;

pub use client::{ApiError, OpenListClient};
