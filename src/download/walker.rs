//! 远程目录递归遍历。
//!
//! 深度优先、逐页顺序请求；任何一页失败都会中止整个遍历，不返回部分结果。

use thiserror::Error;
use tracing::{debug, info};

use super::models::RemoteEntry;
use crate::openlist::ApiError;

/// 分页列目录的能力；`page` 从 1 开始。
pub trait DirectoryLister {
    fn list_page(
        &self,
        path: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<RemoteEntry>, ApiError>;
}

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("列出 '{path}' 第 {page} 页失败: {source}")]
    Request {
        path: String,
        page: usize,
        #[source]
        source: ApiError,
    },
    #[error("文件 '{path}' 缺少下载地址")]
    MissingRawUrl { path: String },
}

pub struct Walker<'a, L: DirectoryLister + ?Sized> {
    lister: &'a L,
    page_size: usize,
}

impl<'a, L: DirectoryLister + ?Sized> Walker<'a, L> {
    pub fn new(lister: &'a L, page_size: usize) -> Self {
        Self {
            lister,
            page_size: page_size.max(1),
        }
    }

    /// 返回 `root` 下全部文件条目（不含目录），顺序与遍历顺序一致。
    pub fn walk(&self, root: &str) -> Result<Vec<RemoteEntry>, ListingError> {
        let mut files = Vec::new();
        self.walk_dir(root, &mut files)?;
        info!(target: "walk", root, files = files.len(), "遍历完成，共 {} 个文件", files.len());
        Ok(files)
    }

    fn walk_dir(&self, path: &str, out: &mut Vec<RemoteEntry>) -> Result<(), ListingError> {
        debug!(target: "walk", "正在列出：{}", path);
        let before = out.len();
        let mut page = 1;

        loop {
            debug!(target: "walk", "正在请求 '{}' 的第 {} 页", path, page);
            let items = self
                .lister
                .list_page(path, page, self.page_size)
                .map_err(|source| ListingError::Request {
                    path: path.to_string(),
                    page,
                    source,
                })?;
            if items.is_empty() {
                break;
            }

            let count = items.len();
            for item in items {
                if item.is_dir {
                    self.walk_dir(&item.path, out)?;
                } else if item.raw_url.trim().is_empty() {
                    return Err(ListingError::MissingRawUrl { path: item.path });
                } else {
                    out.push(item);
                }
            }

            if count < self.page_size {
                break;
            }
            page += 1;
        }

        debug!(target: "walk", "'{}' 完成：{} 个文件", path, out.len() - before);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::join_remote;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// 内存中的远程目录树，记录每次分页请求。
    #[derive(Default)]
    struct MockRemote {
        dirs: HashMap<String, Vec<RemoteEntry>>,
        fail_on: Option<(String, usize)>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl MockRemote {
        fn add_file(&mut self, dir: &str, name: &str, size: u64) {
            let path = join_remote(dir, name);
            let url = format!("http://mock/d{path}");
            self.dirs
                .entry(dir.to_string())
                .or_default()
                .push(RemoteEntry::file(&path, size, &url));
        }

        fn add_dir(&mut self, dir: &str, name: &str) {
            let path = join_remote(dir, name);
            self.dirs
                .entry(dir.to_string())
                .or_default()
                .push(RemoteEntry::dir(&path));
            self.dirs.entry(path).or_default();
        }
    }

    impl DirectoryLister for MockRemote {
        fn list_page(
            &self,
            path: &str,
            page: usize,
            per_page: usize,
        ) -> Result<Vec<RemoteEntry>, ApiError> {
            self.calls.lock().unwrap().push((path.to_string(), page));
            if self
                .fail_on
                .as_ref()
                .is_some_and(|(p, n)| p == path && *n == page)
            {
                return Err(ApiError::Status {
                    status: 504,
                    body: "gateway timeout".into(),
                });
            }
            let Some(items) = self.dirs.get(path) else {
                return Err(ApiError::Api {
                    code: 500,
                    message: "object not found".into(),
                });
            };
            Ok(items
                .iter()
                .skip((page - 1) * per_page)
                .take(per_page)
                .cloned()
                .collect())
        }
    }

    fn sample_tree() -> MockRemote {
        let mut remote = MockRemote::default();
        remote.dirs.insert("/a".into(), Vec::new());
        remote.add_file("/a", "f1.txt", 5);
        remote.add_dir("/a", "sub");
        remote.add_file("/a/sub", "f2.txt", 7);
        remote
    }

    #[test]
    fn walk_returns_flat_file_list() {
        let remote = sample_tree();
        let files = Walker::new(&remote, 200).walk("/a").unwrap();

        let got: Vec<(&str, u64)> = files.iter().map(|f| (f.path.as_str(), f.size)).collect();
        assert_eq!(got, vec![("/a/f1.txt", 5), ("/a/sub/f2.txt", 7)]);
        assert!(files.iter().all(|f| !f.is_dir));
    }

    #[test]
    fn walked_entries_have_urls_and_unique_paths() {
        let mut remote = MockRemote::default();
        remote.dirs.insert("/r".into(), Vec::new());
        for i in 0..7 {
            remote.add_file("/r", &format!("f{i}"), i);
        }
        remote.add_dir("/r", "x");
        remote.add_dir("/r/x", "y");
        for i in 0..4 {
            remote.add_file("/r/x/y", &format!("g{i}"), i);
        }

        let files = Walker::new(&remote, 3).walk("/r").unwrap();
        assert_eq!(files.len(), 11);
        assert!(files.iter().all(|f| !f.raw_url.is_empty()));
        let unique: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(unique.len(), files.len());
    }

    #[test]
    fn full_last_page_triggers_one_more_request() {
        let mut remote = MockRemote::default();
        remote.dirs.insert("/p".into(), Vec::new());
        for i in 0..4 {
            remote.add_file("/p", &format!("f{i}"), 1);
        }

        let files = Walker::new(&remote, 2).walk("/p").unwrap();
        assert_eq!(files.len(), 4);
        let calls = remote.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("/p".to_string(), 1), ("/p".to_string(), 2), ("/p".to_string(), 3)]
        );
    }

    #[test]
    fn short_page_stops_pagination() {
        let mut remote = MockRemote::default();
        remote.dirs.insert("/p".into(), Vec::new());
        for i in 0..3 {
            remote.add_file("/p", &format!("f{i}"), 1);
        }

        Walker::new(&remote, 2).walk("/p").unwrap();
        assert_eq!(remote.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn listing_failure_aborts_walk() {
        let mut remote = sample_tree();
        remote.fail_on = Some(("/a/sub".into(), 1));

        let err = Walker::new(&remote, 200).walk("/a").unwrap_err();
        match err {
            ListingError::Request { path, page, .. } => {
                assert_eq!(path, "/a/sub");
                assert_eq!(page, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_without_url_is_rejected() {
        let mut remote = MockRemote::default();
        remote
            .dirs
            .insert("/z".into(), vec![RemoteEntry::file("/z/broken", 1, "")]);

        assert!(matches!(
            Walker::new(&remote, 10).walk("/z"),
            Err(ListingError::MissingRawUrl { .. })
        ));
    }
}
