//! OpenList Downloader：递归列出 OpenList 远程目录并并发下载到本地。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `openlist`：服务端接口（登录、列目录、取文件、上传）
//! - `download`：遍历、清单持久化、下载调度与进度
//! - `upload`：把本地目录镜像到远程

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

mod base_system;
mod download;
mod openlist;
mod upload;

use base_system::config;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use download::coordinator::{self, DEFAULT_WORKERS, DownloadOptions, Fetcher};
use download::inventory;
use download::models::{DownloadSummary, DownloadTask, RemoteEntry};
use download::progress::ProgressReporter;
use download::walker::{DirectoryLister, Walker};
use openlist::OpenListClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "openlist-downloader")]
#[command(about = "OpenList Downloader")]
struct Cli {
    /// 只遍历远程目录并写出文件清单，不下载
    #[arg(long, default_value_t = false, conflicts_with_all = ["download_only", "upload_only"])]
    list_only: bool,

    /// 跳过遍历，直接按已有文件清单下载
    #[arg(long, default_value_t = false, conflicts_with = "upload_only")]
    download_only: bool,

    /// 上传模式：把配置中的本地目录上传到远程
    #[arg(long, default_value_t = false)]
    upload_only: bool,

    /// 并发线程数
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// 配置文件路径
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 文件清单路径
    #[arg(long, default_value = inventory::DEFAULT_FILE_NAME)]
    filelist: PathBuf,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Full,
    ListOnly,
    DownloadOnly,
    UploadOnly,
}

impl Cli {
    fn mode(&self) -> RunMode {
        if self.list_only {
            RunMode::ListOnly
        } else if self.download_only {
            RunMode::DownloadOnly
        } else if self.upload_only {
            RunMode::UploadOnly
        } else {
            RunMode::Full
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("OpenList Downloader v{}", VERSION);
        return Ok(());
    }

    let _log = init_logging(cli.debug)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    run(&cli).inspect_err(|err| error!(target: "startup", "{err:#}"))
}

fn init_logging(debug: bool) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        color: io::stdout().is_terminal(),
    };
    LogSystem::init(opts).context("初始化日志失败")
}

fn run(cli: &Cli) -> Result<()> {
    let config = config::load::<Config>(Some(&cli.config))
        .with_context(|| format!("加载配置 {} 失败", cli.config.display()))?;

    let mut client = OpenListClient::new(&config.openlist_url, config.request_timeout())?;
    client.authenticate(
        config.session_token(),
        &config.username,
        &config.password,
    )?;

    if cli.mode() == RunMode::UploadOnly {
        return run_upload(&client, &config, cli.workers.max(1));
    }
    run_download(&client, &config, cli)
}

/// 遍历 → 写清单 → 下载；`--list-only` / `--download-only` 只执行其中一段。
fn run_download<C>(client: &C, config: &Config, cli: &Cli) -> Result<()>
where
    C: DirectoryLister + Fetcher + ?Sized,
{
    let mode = cli.mode();
    let entries = match mode {
        RunMode::DownloadOnly => {
            let entries = inventory::load(&cli.filelist)?;
            info!(target: "inventory", "已从 {} 读取 {} 个条目", cli.filelist.display(), entries.len());
            entries
        }
        _ => list_remote(client, config, &cli.filelist)?,
    };
    if mode == RunMode::ListOnly {
        info!(target: "startup", "已生成文件清单 {}，按 --list-only 要求结束", cli.filelist.display());
        return Ok(());
    }

    if entries.is_empty() {
        warn!(target: "download", "没有需要下载的文件");
        return Ok(());
    }

    let save_dir = config.save_dir();
    let tasks: Vec<DownloadTask> = entries
        .iter()
        .map(|entry| DownloadTask::from_entry(entry, &config.remote_path, &save_dir))
        .collect();

    let mut progress = ProgressReporter::new("下载", tasks.len());
    let outcomes = coordinator::run(
        client,
        &tasks,
        DownloadOptions {
            workers: cli.workers.max(1),
            skip_existing: config.skip_existing,
        },
        &mut progress,
    );

    let summary = DownloadSummary::from_outcomes(&outcomes);
    info!(
        target: "download",
        total = summary.total,
        completed = summary.completed,
        skipped = summary.skipped,
        failed = summary.failed,
        "下载结束：完成 {}，跳过 {}，失败 {}",
        summary.completed,
        summary.skipped,
        summary.failed
    );
    if !summary.is_success() {
        bail!("{} 个文件下载失败", summary.failed);
    }
    info!(target: "download", "所有文件已保存到 {}", save_dir.display());
    Ok(())
}

/// 遍历失败时直接返回错误，不会写出（或覆盖）清单文件。
fn list_remote<L: DirectoryLister + ?Sized>(
    lister: &L,
    config: &Config,
    filelist: &Path,
) -> Result<Vec<RemoteEntry>> {
    info!(target: "walk", "开始遍历远程目录 {}", config.remote_path);
    let entries = Walker::new(lister, config.page_size).walk(&config.remote_path)?;
    inventory::save(&entries, filelist)?;
    info!(target: "inventory", "文件清单已写入 {}", filelist.display());
    Ok(entries)
}

fn run_upload(client: &OpenListClient, config: &Config, workers: usize) -> Result<()> {
    let tasks = upload::plan(&config.upload.local_path, &config.upload.remote_upload_path)?;
    if tasks.is_empty() {
        warn!(target: "upload", "本地目录 {} 中没有文件", config.upload.local_path);
        return Ok(());
    }

    let mut progress = ProgressReporter::new("上传", tasks.len());
    let summary = upload::run(client, &tasks, workers, &mut progress);
    info!(
        target: "upload",
        "上传结束：成功 {}，失败 {}",
        summary.uploaded,
        summary.failed
    );
    if !summary.is_success() {
        bail!("{} 个文件上传失败", summary.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openlist::ApiError;
    use std::fs;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;

    #[test]
    fn defaults_run_full_pipeline() {
        let cli = Cli::try_parse_from(["openlist-downloader"]).unwrap();
        assert_eq!(cli.mode(), RunMode::Full);
        assert_eq!(cli.workers, DEFAULT_WORKERS);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.filelist, PathBuf::from(inventory::DEFAULT_FILE_NAME));
    }

    #[test]
    fn mode_flags_select_single_stage() {
        let cli = Cli::try_parse_from(["openlist-downloader", "--list-only"]).unwrap();
        assert_eq!(cli.mode(), RunMode::ListOnly);
        let cli = Cli::try_parse_from(["openlist-downloader", "--download-only", "--workers", "3"])
            .unwrap();
        assert_eq!(cli.mode(), RunMode::DownloadOnly);
        assert_eq!(cli.workers, 3);
    }

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        assert!(
            Cli::try_parse_from(["openlist-downloader", "--list-only", "--download-only"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["openlist-downloader", "--download-only", "--upload-only"])
                .is_err()
        );
    }

    /// 单层目录 `/r` 的内存服务端；记录每次取文件的地址。
    #[derive(Default)]
    struct FakeServer {
        files: Vec<(String, String)>,
        listing_fails: bool,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn with_files(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.to_string()))
                    .collect(),
                ..Self::default()
            }
        }

        fn url(path: &str) -> String {
            format!("http://fake/d{path}")
        }
    }

    impl DirectoryLister for FakeServer {
        fn list_page(
            &self,
            path: &str,
            page: usize,
            _per_page: usize,
        ) -> Result<Vec<RemoteEntry>, ApiError> {
            if self.listing_fails {
                return Err(ApiError::Api {
                    code: 500,
                    message: "storage offline".into(),
                });
            }
            if path != "/r" || page > 1 {
                return Ok(Vec::new());
            }
            Ok(self
                .files
                .iter()
                .map(|(p, body)| RemoteEntry::file(p, body.len() as u64, &Self::url(p)))
                .collect())
        }
    }

    impl Fetcher for FakeServer {
        fn fetch(&self, raw_url: &str) -> Result<Box<dyn Read + '_>, ApiError> {
            self.fetched.lock().unwrap().push(raw_url.to_string());
            if raw_url.contains("broken") {
                return Err(ApiError::Status {
                    status: 404,
                    body: "object not found".into(),
                });
            }
            let body = self
                .files
                .iter()
                .find(|(p, _)| Self::url(p) == raw_url)
                .map(|(_, body)| body.as_bytes())
                .unwrap_or_default();
            Ok(Box::new(Cursor::new(body)))
        }
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        config: Config,
        filelist: PathBuf,
        save_dir: PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let save_dir = dir.path().join("out");
        let config = Config {
            openlist_url: "http://fake".into(),
            token: "t".into(),
            remote_path: "/r".into(),
            local_save_dir: save_dir.to_string_lossy().into_owned(),
            ..Config::default()
        };
        Workspace {
            filelist: dir.path().join("filelist.json"),
            save_dir,
            config,
            _dir: dir,
        }
    }

    fn cli_for(ws: &Workspace, flags: &[&str]) -> Cli {
        let mut args = vec!["openlist-downloader", "--workers", "2", "--filelist"];
        args.push(ws.filelist.to_str().unwrap());
        args.extend_from_slice(flags);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn failed_walk_writes_no_inventory() {
        let ws = workspace();
        let server = FakeServer {
            listing_fails: true,
            ..FakeServer::with_files(&[("/r/a.txt", "aaa")])
        };

        let err = run_download(&server, &ws.config, &cli_for(&ws, &[])).unwrap_err();

        assert!(format!("{err:#}").contains("storage offline"));
        assert!(!ws.filelist.exists());
        assert!(server.fetched.lock().unwrap().is_empty());
    }

    #[test]
    fn list_only_saves_inventory_without_downloading() {
        let ws = workspace();
        let server = FakeServer::with_files(&[("/r/a.txt", "aaa"), ("/r/b.txt", "bb")]);

        run_download(&server, &ws.config, &cli_for(&ws, &["--list-only"])).unwrap();

        let saved = inventory::load(&ws.filelist).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(server.fetched.lock().unwrap().is_empty());
        assert!(!ws.save_dir.exists());
    }

    #[test]
    fn full_run_downloads_every_listed_file() {
        let ws = workspace();
        let server = FakeServer::with_files(&[("/r/a.txt", "aaa"), ("/r/b.txt", "bb")]);

        run_download(&server, &ws.config, &cli_for(&ws, &[])).unwrap();

        assert_eq!(fs::read_to_string(ws.save_dir.join("a.txt")).unwrap(), "aaa");
        assert_eq!(fs::read_to_string(ws.save_dir.join("b.txt")).unwrap(), "bb");
        assert!(ws.filelist.exists());
    }

    #[test]
    fn any_failed_download_fails_the_run() {
        let ws = workspace();
        let server = FakeServer::with_files(&[("/r/ok.txt", "ok"), ("/r/broken.bin", "xxxx")]);

        let err = run_download(&server, &ws.config, &cli_for(&ws, &[])).unwrap_err();

        assert!(err.to_string().contains("1 个文件下载失败"));
        assert_eq!(fs::read_to_string(ws.save_dir.join("ok.txt")).unwrap(), "ok");
        assert!(!ws.save_dir.join("broken.bin").exists());
    }

    #[test]
    fn download_only_uses_saved_inventory_without_listing() {
        let ws = workspace();
        let files = [("/r/a.txt", "aaa")];
        inventory::save(
            &[RemoteEntry::file("/r/a.txt", 3, &FakeServer::url("/r/a.txt"))],
            &ws.filelist,
        )
        .unwrap();
        let server = FakeServer {
            listing_fails: true,
            ..FakeServer::with_files(&files)
        };

        run_download(&server, &ws.config, &cli_for(&ws, &["--download-only"])).unwrap();

        assert_eq!(fs::read_to_string(ws.save_dir.join("a.txt")).unwrap(), "aaa");
    }

    #[test]
    fn download_only_without_inventory_points_to_list_only() {
        let ws = workspace();
        let server = FakeServer::default();

        let err =
            run_download(&server, &ws.config, &cli_for(&ws, &["--download-only"])).unwrap_err();

        assert!(err.to_string().contains("--list-only"));
        assert!(server.fetched.lock().unwrap().is_empty());
    }
}
