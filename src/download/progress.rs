//! 进度上报与 CLI 进度条管理。

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

const LOG_EVERY: usize = 20;

pub struct ProgressReporter {
    phase: &'static str,
    done: usize,
    total: usize,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// `phase` 显示在进度条前；stderr 不是终端时只输出日志。
    pub(crate) fn new(phase: &'static str, total: usize) -> Self {
        let bar = if std::io::stderr().is_terminal() && total > 0 {
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
            bar.set_style(style);
            bar.set_prefix(phase);
            Some(bar)
        } else {
            None
        };
        Self {
            phase,
            done: 0,
            total,
            bar,
        }
    }

    #[cfg(test)]
    pub(crate) fn hidden(phase: &'static str, total: usize) -> Self {
        Self {
            phase,
            done: 0,
            total,
            bar: None,
        }
    }

    /// 任意一个任务结束（跳过/完成/失败）都计一次。
    pub(crate) fn inc(&mut self) {
        self.done = (self.done + 1).min(self.total);
        if let Some(bar) = self.bar.as_ref() {
            bar.inc(1);
        }
        if self.done % LOG_EVERY == 0 || self.done == self.total {
            info!(
                target: "progress",
                phase = self.phase,
                done = self.done,
                total = self.total,
                "{}进度 {}/{}",
                self.phase,
                self.done,
                self.total
            );
        }
    }

    pub(crate) fn done(&self) -> usize {
        self.done
    }

    pub(crate) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}
