//! 固定大小的并发工作池。
//!
//! 所有任务先放入共享队列，`workers` 个线程各自循环领取下一个任务，
//! 结果经第二个通道回到调用线程，由调用线程统一汇总（进度、日志）。

use std::thread;

use crossbeam_channel as channel;
use tracing::warn;

/// 以 `workers` 个线程执行 `job`，每完成一个任务在调用线程上回调 `on_done`。
///
/// 返回值与 `items` 一一对应、顺序一致；执行/完成顺序不做保证。
pub(crate) fn run_pool<T, R, F, D>(items: &[T], workers: usize, job: F, mut on_done: D) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
    D: FnMut(&T, &R),
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());

    let (task_tx, task_rx) = channel::unbounded::<usize>();
    for idx in 0..items.len() {
        // receiver 仍在本函数内，发送不会失败
        let _ = task_tx.send(idx);
    }
    drop(task_tx);

    let (done_tx, done_rx) = channel::unbounded::<(usize, R)>();
    let mut results: Vec<Option<R>> = items.iter().map(|_| None).collect();

    thread::scope(|scope| {
        let job = &job;
        let mut spawned = 0;
        for id in 0..workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn_scoped(scope, move || {
                    for idx in task_rx.iter() {
                        let result = job(&items[idx]);
                        if done_tx.send((idx, result)).is_err() {
                            return;
                        }
                    }
                });
            match handle {
                Ok(_) => spawned += 1,
                Err(err) => warn!(target: "download", "无法创建工作线程 {}: {}", id, err),
            }
        }
        drop(done_tx);

        if spawned == 0 {
            // 一个线程都起不来时退化为在当前线程顺序执行
            for idx in task_rx.iter() {
                let result = job(&items[idx]);
                on_done(&items[idx], &result);
                results[idx] = Some(result);
            }
            return;
        }

        for (idx, result) in done_rx.iter() {
            on_done(&items[idx], &result);
            results[idx] = Some(result);
        }
    });

    results.into_iter().flatten().collect()
}
