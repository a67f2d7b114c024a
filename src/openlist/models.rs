//! OpenList API 的请求/响应结构。

use serde::{Deserialize, Serialize};

/// 所有接口共用的外层结构；HTTP 200 时 `code != 200` 仍视为失败。
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginData {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListRequest<'a> {
    pub path: &'a str,
    pub password: &'a str,
    pub page: usize,
    pub per_page: usize,
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListData {
    #[serde(default)]
    pub content: Option<Vec<ListItem>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListItem {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub sign: Option<String>,
    #[serde(default)]
    pub raw_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PathRequest<'a> {
    pub path: &'a str,
}
