use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use reqwest::blocking::{Body, Client};
use reqwest::header::{
    ACCEPT_ENCODING, AUTHORIZATION, CONNECTION, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use thiserror::Error;
use tracing::{debug, info};

use super::models::{
    ApiResponse, ListData, ListItem, ListRequest, LoginData, LoginRequest, PathRequest,
};
use crate::download::coordinator::Fetcher;
use crate::download::models::{RemoteEntry, join_remote};
use crate::download::walker::DirectoryLister;
use crate::upload::RemoteWriter;

const BODY_PREVIEW_CHARS: usize = 300;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 保留字母数字、`/` 与 `-_.~`，其余字节做百分号编码。
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("接口返回错误 (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("响应不是有效 JSON: {source}; body={body:?}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("非法请求头 {0}")]
    InvalidHeader(&'static str),
    #[error("本地文件读取失败: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("config.json 中缺少用户名/密码")]
    MissingCredentials,
    #[error("登录失败: {0}")]
    Rejected(#[source] ApiError),
}

/// OpenList 阻塞式客户端。
///
/// 登录后令牌只读，可在下载线程间以 `&OpenListClient` 共享。
pub struct OpenListClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl OpenListClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("openlist-downloader/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// 优先使用预先提供的令牌，否则以用户名/密码登录。
    pub fn authenticate(
        &mut self,
        token: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if let Some(token) = token {
            self.token = Some(token.to_string());
            info!(target: "auth", "使用提供的令牌");
            return Ok(());
        }
        self.login(username, password)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        info!(target: "auth", "正在登录到 {}...", self.base_url);
        let data: LoginData = self
            .post_api("/api/auth/login", &LoginRequest { username, password })
            .map_err(AuthError::Rejected)?;
        if data.token.is_empty() {
            return Err(AuthError::Rejected(ApiError::Api {
                code: 200,
                message: "响应中缺少 token".to_string(),
            }));
        }
        self.token = Some(data.token);
        info!(target: "auth", "登录成功");
        Ok(())
    }

    /// 列出 `path` 的第 `page` 页（从 1 开始）。
    pub fn list_page(
        &self,
        path: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<RemoteEntry>, ApiError> {
        let data: ListData = self.post_api(
            "/api/fs/list",
            &ListRequest {
                path,
                password: "",
                page,
                per_page,
                refresh: false,
            },
        )?;
        let items = data.content.unwrap_or_default();
        Ok(entries_from_listing(&self.base_url, path, items))
    }

    /// GET 文件直链；仅当直链位于本服务下时附带令牌。
    pub fn open(&self, raw_url: &str) -> Result<reqwest::blocking::Response, ApiError> {
        let mut req = self.http.get(raw_url);
        if same_origin(&self.base_url, raw_url) {
            req = req.headers(self.auth_headers()?);
        }
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }
        Ok(resp)
    }

    /// 创建远程目录；目录已存在不算错误。
    pub fn mkdir(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/fs/mkdir", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&PathRequest { path })
            .send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        match decode_ack(status, &body) {
            Err(ApiError::Api { message, .. }) if message.contains("already exists") => Ok(()),
            other => other,
        }
    }

    /// 以流式请求体上传单个本地文件，不覆盖远程同名文件。
    pub fn put_file(&self, local: &Path, remote: &str) -> Result<(), ApiError> {
        let file = File::open(local)?;
        let meta = file.metadata()?;
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let mut headers = self.auth_headers()?;
        let encoded = encode_path(remote);
        headers.insert(
            HeaderName::from_static("file-path"),
            HeaderValue::from_str(&encoded).map_err(|_| ApiError::InvalidHeader("File-Path"))?,
        );
        headers.insert(
            HeaderName::from_static("last-modified"),
            HeaderValue::from_str(&last_modified.to_string())
                .map_err(|_| ApiError::InvalidHeader("Last-Modified"))?,
        );
        headers.insert(
            HeaderName::from_static("overwrite"),
            HeaderValue::from_static("false"),
        );

        let url = format!("{}/api/fs/put", self.base_url);
        let resp = self
            .http
            .put(&url)
            .headers(headers)
            .body(Body::sized(file, meta.len()))
            .send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        decode_ack(status, &body)
    }

    fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.token.as_deref() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(token).map_err(|_| ApiError::InvalidHeader("Authorization"))?,
            );
        }
        Ok(headers)
    }

    fn post_api<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(target: "api", "POST {}", url);
        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()?;
        let status = resp.status().as_u16();
        let text = resp.text()?;
        decode_api(status, &text)
    }
}

impl DirectoryLister for OpenListClient {
    fn list_page(
        &self,
        path: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<RemoteEntry>, ApiError> {
        OpenListClient::list_page(self, path, page, per_page)
    }
}

impl Fetcher for OpenListClient {
    fn fetch(&self, raw_url: &str) -> Result<Box<dyn Read + '_>, ApiError> {
        Ok(Box::new(self.open(raw_url)?))
    }
}

impl RemoteWriter for OpenListClient {
    fn mkdir(&self, path: &str) -> Result<(), ApiError> {
        OpenListClient::mkdir(self, path)
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<(), ApiError> {
        OpenListClient::put_file(self, local, remote)
    }
}

pub(crate) fn decode_api<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let parsed: ApiResponse<T> = decode_envelope(status, body)?;
    parsed.data.ok_or_else(|| ApiError::Api {
        code: parsed.code,
        message: "响应缺少 data 字段".to_string(),
    })
}

pub(crate) fn decode_ack(status: u16, body: &str) -> Result<(), ApiError> {
    decode_envelope::<IgnoredAny>(status, body).map(|_| ())
}

fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> Result<ApiResponse<T>, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            status,
            body: preview(body),
        });
    }
    let parsed: ApiResponse<T> =
        serde_json::from_str(body).map_err(|source| ApiError::Decode {
            source,
            body: preview(body),
        })?;
    if parsed.code != 200 {
        return Err(ApiError::Api {
            code: parsed.code,
            message: parsed.message,
        });
    }
    Ok(parsed)
}

pub(crate) fn entries_from_listing(
    base_url: &str,
    parent: &str,
    items: Vec<ListItem>,
) -> Vec<RemoteEntry> {
    items
        .into_iter()
        .map(|item| {
            let path = join_remote(parent, &item.name);
            if item.is_dir {
                return RemoteEntry::dir(&path);
            }
            let raw_url = item
                .raw_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| download_link(base_url, &path, item.sign.as_deref()));
            RemoteEntry::file(&path, item.size.max(0) as u64, &raw_url)
        })
        .collect()
}

/// 协议、主机与端口（含默认端口）都一致才算同一服务；无法解析的地址一律视为外部。
pub(crate) fn same_origin(base_url: &str, raw_url: &str) -> bool {
    match (Url::parse(base_url), Url::parse(raw_url)) {
        (Ok(base), Ok(raw)) => {
            base.scheme() == raw.scheme()
                && base.host_str() == raw.host_str()
                && base.port_or_known_default() == raw.port_or_known_default()
        }
        _ => false,
    }
}

/// `{base}/d{encoded path}[?sign=...]`，OpenList 的直接下载地址。
pub(crate) fn download_link(base_url: &str, path: &str, sign: Option<&str>) -> String {
    let mut url = format!("{}/d{}", base_url, encode_path(path));
    if let Some(sign) = sign.map(str::trim).filter(|s| !s.is_empty()) {
        url.push_str("?sign=");
        url.push_str(&utf8_percent_encode(sign, NON_ALPHANUMERIC).to_string());
    }
    url
}

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
