//! 控制台 + `logs/latest.log` 双通道日志，退出时把本次日志打包为 zip。

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{io, panic, process, thread, time::Duration};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, warn};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LOGS_DIR: &str = "logs";
const LATEST_LOG: &str = "latest.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
/// Windows 上写线程退出后文件句柄释放有延迟
const SETTLE_DELAY: Duration = Duration::from_millis(1000);
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("初始化日志订阅器失败: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("日志文件读写失败: {0}")]
    Io(#[from] io::Error),
    #[error("日志打包失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("时间格式化失败: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogOptions {
    /// 控制台输出 DEBUG 级别（文件始终记录 DEBUG）
    pub debug: bool,
    /// 控制台输出 ANSI 颜色；stdout 被重定向时应关闭
    pub color: bool,
}

/// `logs/` 目录下的当前日志与历史归档。
struct LogFiles {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogFiles {
    fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let latest = dir.join(LATEST_LOG);
        Self { dir, latest }
    }

    /// 建目录；上次残留的日志过大时先归档，避免无限增长。
    fn prepare(&self) -> Result<(), LogError> {
        fs::create_dir_all(&self.dir)?;
        let size = fs::metadata(&self.latest).map(|m| m.len()).unwrap_or(0);
        if size >= ROTATE_AT_BYTES {
            self.archive()?;
        }
        Ok(())
    }

    /// 把 `latest.log` 压缩为 `log_<时间戳>.zip` 并删除原文件；空日志直接删除。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let size = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if size == 0 {
            fs::remove_file(&self.latest)?;
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let target = self.free_archive_path(&stamp);

        let mut zip = zip::ZipWriter::new(File::create(&target)?);
        zip.start_file(
            format!("openlist-downloader_{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(&self.latest)?, &mut zip)?;
        zip.finish()?;
        fs::remove_file(&self.latest)?;

        Ok(Some(target))
    }

    /// 同一秒内多次归档时追加序号，不覆盖已有归档。
    fn free_archive_path(&self, stamp: &str) -> PathBuf {
        let first = self.dir.join(format!("log_{stamp}.zip"));
        if !first.exists() {
            return first;
        }
        (1..)
            .map(|n| self.dir.join(format!("log_{stamp}_{n}.zip")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

/// 日志系统句柄；在 `main` 中持有到进程结束，Drop 时刷新并归档。
pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    /// 安装全局订阅器以及 Ctrl+C / panic 钩子。日志目录固定为工作目录下的 `logs/`。
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        let files = LogFiles::new(LOGS_DIR);
        files.prepare()?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("log-writer")
            .finish(rolling::never(&files.dir, LATEST_LOG));

        let console_layer = fmt::layer()
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(options.color)
            .with_writer(io::stdout)
            .with_filter(if options.debug {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            });

        // 文件里保留 target，便于按 auth/walk/download 等阶段筛选
        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        let shutdown = Arc::new(Shutdown {
            files,
            guard: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
        });
        shutdown.install_ctrlc();
        shutdown.install_panic_hook();

        Ok(Self { shutdown })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

/// 正常退出、Ctrl+C 与 panic 三条路径共用的收尾逻辑，只执行一次。
struct Shutdown {
    files: LogFiles,
    guard: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
}

impl Shutdown {
    fn install_ctrlc(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let installed = ctrlc::set_handler(move || {
            // 中断时写了一半的文件会在下次运行时因大小不符被重新下载
            warn!(target: "startup", "收到中断信号，正在退出");
            shutdown.run();
            process::exit(INTERRUPTED_EXIT_CODE);
        });
        if let Err(err) = installed {
            warn!(target: "startup", "无法安装 Ctrl+C 处理器: {err}");
        }
    }

    fn install_panic_hook(self: &Arc<Self>) {
        let shutdown = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let thread = thread::current();
            let name = thread.name().unwrap_or("unnamed");
            match info.location() {
                Some(loc) => error!(
                    target: "startup",
                    "线程 {name} panic ({}:{}): {info}",
                    loc.file(),
                    loc.line()
                ),
                None => error!(target: "startup", "线程 {name} panic: {info}"),
            }
            shutdown.run();
            previous(info);
        }));
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        // 丢弃 guard 会刷新并停止写线程，之后才能安全地压缩文件
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        thread::sleep(SETTLE_DELAY);

        match self.files.archive() {
            Ok(Some(path)) => eprintln!("日志已归档到 {}", path.display()),
            Ok(None) => {}
            Err(err) => eprintln!("日志归档失败: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn files_in(dir: &tempfile::TempDir) -> LogFiles {
        LogFiles::new(dir.path().join("logs"))
    }

    #[test]
    fn archive_zips_and_removes_latest_log() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(&dir);
        fs::create_dir_all(&files.dir).unwrap();
        fs::write(&files.latest, "line one\nline two\n").unwrap();

        let archive = files.archive().unwrap().unwrap();
        assert!(!files.latest.exists());
        assert!(archive.starts_with(&files.dir));

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        let mut body = String::new();
        zip.by_index(0).unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "line one\nline two\n");
    }

    #[test]
    fn archive_without_log_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(&dir);
        fs::create_dir_all(&files.dir).unwrap();
        assert!(files.archive().unwrap().is_none());
    }

    #[test]
    fn empty_log_is_dropped_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(&dir);
        fs::create_dir_all(&files.dir).unwrap();
        fs::write(&files.latest, "").unwrap();

        assert!(files.archive().unwrap().is_none());
        assert!(!files.latest.exists());
    }

    #[test]
    fn archives_in_same_second_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(&dir);
        fs::create_dir_all(&files.dir).unwrap();

        fs::write(&files.latest, "first").unwrap();
        let a = files.archive().unwrap().unwrap();
        fs::write(&files.latest, "second").unwrap();
        let b = files.archive().unwrap().unwrap();

        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn prepare_creates_dir_and_keeps_small_log() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(&dir);
        files.prepare().unwrap();
        assert!(files.dir.is_dir());

        fs::write(&files.latest, "short").unwrap();
        files.prepare().unwrap();
        assert!(files.latest.exists());
    }
}
