//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供 `config.json` 的字段元信息（用于校验提示）。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 服务配置
    #[serde(default = "default_string")]
    pub openlist_url: String,
    #[serde(default = "default_string")]
    pub username: String,
    #[serde(default = "default_string")]
    pub password: String,
    #[serde(default = "default_string")]
    pub token: String,

    // 路径配置
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    #[serde(default = "default_string")]
    pub local_save_dir: String,

    // 网络配置
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    // 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_string")]
    pub local_path: String,
    #[serde(default = "default_string")]
    pub remote_upload_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openlist_url: default_string(),
            username: default_string(),
            password: default_string(),
            token: default_string(),
            remote_path: default_remote_path(),
            local_save_dir: default_string(),
            page_size: default_page_size(),
            timeout: default_timeout(),
            skip_existing: default_true(),
            upload: UploadConfig::default(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.json";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 10] = [
            FieldMeta {
                name: "openlist_url",
                description: "OpenList 实例地址",
                required: true,
            },
            FieldMeta {
                name: "username",
                description: "登录用户名（设置 token 时可留空）",
                required: false,
            },
            FieldMeta {
                name: "password",
                description: "登录密码（设置 token 时可留空）",
                required: false,
            },
            FieldMeta {
                name: "token",
                description: "预先获取的会话令牌，非空时跳过登录",
                required: false,
            },
            FieldMeta {
                name: "remote_path",
                description: "要下载的远程目录",
                required: true,
            },
            FieldMeta {
                name: "local_save_dir",
                description: "本地保存目录",
                required: true,
            },
            FieldMeta {
                name: "page_size",
                description: "列目录时每页条目数",
                required: false,
            },
            FieldMeta {
                name: "timeout",
                description: "请求超时时间（秒）",
                required: false,
            },
            FieldMeta {
                name: "skip_existing",
                description: "跳过本地已存在且大小一致的文件",
                required: false,
            },
            FieldMeta {
                name: "upload",
                description: "上传配置：local_path / remote_upload_path",
                required: false,
            },
        ];
        &FIELDS
    }

    fn finalize(mut self) -> Result<Self, ConfigError> {
        self.openlist_url = self.openlist_url.trim().trim_end_matches('/').to_string();
        if self.openlist_url.is_empty() {
            return Err(ConfigError::Validation("openlist_url 不能为空".to_string()));
        }
        if self.token.trim().is_empty()
            && (self.username.trim().is_empty() || self.password.is_empty())
        {
            return Err(ConfigError::Validation(
                "config.json 中缺少用户名/密码（或 token）".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Validation("page_size 必须大于 0".to_string()));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Validation("timeout 必须大于 0".to_string()));
        }
        Ok(self)
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn save_dir(&self) -> PathBuf {
        PathBuf::from(&self.local_save_dir)
    }

    pub fn session_token(&self) -> Option<&str> {
        let t = self.token.trim();
        if t.is_empty() { None } else { Some(t) }
    }
}

fn default_string() -> String {
    String::new()
}

fn default_true() -> bool {
    true
}

fn default_remote_path() -> String {
    "/".to_string()
}

fn default_page_size() -> usize {
    200
}

fn default_timeout() -> u64 {
    30
}
