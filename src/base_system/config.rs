//! 配置文件读取、默认值合并与模板生成。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读写 {} 失败: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{} 不是有效的 JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("配置校验失败: {0}")]
    Validation(String),
    #[error("配置文件不存在，已在 {} 生成模板，请填写后重新运行", .path.display())]
    TemplateCreated { path: PathBuf },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];

    /// 合并默认值之后的最终校验/规范化。
    fn finalize(self) -> Result<Self, ConfigError> {
        Ok(self)
    }
}

/// Load a config file, merging user values over `T::default()`.
///
/// # Path resolution
/// - If `config_path` is Some: uses the exact path provided
/// - Otherwise: uses current directory/FILE_NAME
///
/// A missing file is replaced by a template holding every default value and
/// reported as [`ConfigError::TemplateCreated`].
pub fn load<T: ConfigSpec>(config_path: Option<&Path>) -> Result<T, ConfigError> {
    let path = resolve_path::<T>(config_path);

    if !path.exists() {
        write_template(&T::default(), &path)?;
        return Err(ConfigError::TemplateCreated { path });
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    let user_json: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    if !user_json.is_object() {
        return Err(ConfigError::Validation(
            "config must be a json object".to_string(),
        ));
    }

    let missing = missing_required::<T>(&user_json);
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|f| format!("{}（{}）", f.name, f.description))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ConfigError::Validation(format!(
            "{} 缺少必填项: {}",
            path.display(),
            names
        )));
    }

    let mut merged =
        serde_json::to_value(T::default()).map_err(|err| ConfigError::Validation(err.to_string()))?;
    merge_values(&mut merged, user_json);

    let config: T =
        serde_json::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;
    config.finalize()
}

pub fn write_template<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(config)
        .map_err(|err| ConfigError::Validation(err.to_string()))?;
    fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn missing_required<T: ConfigSpec>(user: &Value) -> Vec<FieldMeta> {
    let Value::Object(map) = user else {
        return T::fields().iter().filter(|f| f.required).copied().collect();
    };
    T::fields()
        .iter()
        .filter(|f| f.required)
        .filter(|f| match map.get(f.name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .copied()
        .collect()
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Object(dest), Value::Object(src)) => {
            for (key, user_val) in src {
                if let Some(dest_val) = dest.get_mut(&key) {
                    merge_values(dest_val, user_val);
                } else {
                    dest.insert(key, user_val);
                }
            }
        }
        // `"username": null` 之类的写法保留默认值
        (_, Value::Null) => {}
        (dest, other) => {
            *dest = other;
        }
    }
}

fn resolve_path<T: ConfigSpec>(path: Option<&Path>) -> PathBuf {
    match path {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(T::FILE_NAME),
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
