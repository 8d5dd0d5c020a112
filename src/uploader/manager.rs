// 上传队列管理器
//
// 负责管理多个上传任务：
// - 校验并入队
// - 并发控制（信号量，同时上传数不超过 max_simultaneous）
// - 进度跟踪（单调不减，事件按任务节流）
// - 取消 / 重试 / 移除 / 清理
// - 一轮上传全部终结后触发一次完成回调（upload_all 或单独的重试）

use crate::events::{EventBus, ProgressThrottler, UploadEvent};
use crate::uploader::{
    partition, ProgressCallback, TransportError, UploadConstraints, UploadFile, UploadProgress,
    UploadStatus, UploadTask, UploadTransport, ValidationError,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 完成回调，参数为全部任务的最终快照
pub type CompletionCallback = Arc<dyn Fn(&[UploadTask]) + Send + Sync>;

/// `add_files` 的结果
#[derive(Debug, Default)]
pub struct AddFilesResult {
    /// 新建的任务（快照）
    pub valid: Vec<UploadTask>,
    /// 被拒绝的文件
    pub invalid: Vec<ValidationError>,
}

/// 各状态任务计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub success: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl UploadStats {
    fn from_tasks(tasks: &[UploadTask]) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                UploadStatus::Success => stats.success += 1,
                UploadStatus::Error => stats.error += 1,
                UploadStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

/// 一次调度的运行句柄（代数用于区分重试前后的运行）
struct RunHandle {
    generation: u64,
    cancel_token: CancellationToken,
}

struct Inner {
    /// 所有任务（保持入队顺序）
    tasks: Mutex<Vec<UploadTask>>,
    /// 已调度任务的运行句柄（task_id -> handle）
    runs: DashMap<String, RunHandle>,
    /// 运行代数
    next_generation: AtomicU64,
    /// 在途运行数（含等待许可的）
    in_flight: AtomicUsize,
    /// 在途运行数归零时通知
    settled: Notify,
    /// 正在等待的 upload_all 数量；在途数归零时若为 0，由最后一个运行收尾
    waiting_rounds: Mutex<usize>,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    constraints: UploadConstraints,
    transport: Arc<dyn UploadTransport>,
    events: EventBus,
    throttler: ProgressThrottler,
    on_complete: RwLock<Option<CompletionCallback>>,
}

/// upload_all 等待期间持有，离开时（含 future 被丢弃）计数减一
struct RoundGuard<'a> {
    inner: &'a Inner,
}

impl<'a> RoundGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        *inner.waiting_rounds.lock() += 1;
        Self { inner }
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        let mut waiting = self.inner.waiting_rounds.lock();
        *waiting = waiting.saturating_sub(1);
    }
}

/// 上传队列管理器（clone 共享同一队列）
#[derive(Clone)]
pub struct UploadManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("constraints", &self.inner.constraints)
            .field("stats", &self.stats())
            .finish()
    }
}

impl UploadManager {
    /// 创建上传管理器
    pub fn new(
        constraints: UploadConstraints,
        transport: Arc<dyn UploadTransport>,
        events: EventBus,
    ) -> Self {
        let max_simultaneous = constraints.max_simultaneous.max(1);
        info!(
            "创建上传管理器: 最大同时上传数={}, 队列容量={}",
            max_simultaneous, constraints.max_files
        );

        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Vec::new()),
                runs: DashMap::new(),
                next_generation: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                settled: Notify::new(),
                waiting_rounds: Mutex::new(0),
                semaphore: Arc::new(Semaphore::new(max_simultaneous)),
                constraints,
                transport,
                events,
                throttler: ProgressThrottler::default(),
                on_complete: RwLock::new(None),
            }),
        }
    }

    pub fn constraints(&self) -> &UploadConstraints {
        &self.inner.constraints
    }

    /// 设置完成回调（每轮上传全部终结时恰好调用一次）
    pub fn set_on_complete(&self, callback: CompletionCallback) {
        *self.inner.on_complete.write() = Some(callback);
    }

    /// 订阅上传事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe_upload()
    }

    /// 校验并入队
    pub fn add_files(&self, files: Vec<UploadFile>) -> AddFilesResult {
        let mut tasks = self.inner.tasks.lock();
        let capacity = self.inner.constraints.max_files.saturating_sub(tasks.len());
        let result = partition(files, &self.inner.constraints, capacity);

        for rejected in &result.rejected {
            warn!("文件未通过校验: {}", rejected);
        }

        let mut created = Vec::with_capacity(result.accepted.len());
        for file in result.accepted {
            let task = UploadTask::new(file);
            self.inner.events.publish_upload(UploadEvent::Created {
                task_id: task.id.clone(),
                file_name: task.file.name.clone(),
                size: task.file.size,
            });
            created.push(task.clone());
            tasks.push(task);
        }

        info!(
            "添加上传文件: 接受 {} 个, 拒绝 {} 个, 队列共 {} 个",
            created.len(),
            result.rejected.len(),
            tasks.len()
        );

        AddFilesResult {
            valid: created,
            invalid: result.rejected,
        }
    }

    /// 上传所有等待中的任务
    ///
    /// 所有在途任务终结后返回全部任务的快照，并调用一次完成回调
    pub async fn upload_all(&self) -> Vec<UploadTask> {
        let pending: Vec<String> = self
            .inner
            .tasks
            .lock()
            .iter()
            .filter(|t| t.status == UploadStatus::Pending)
            .map(|t| t.id.clone())
            .collect();

        info!("开始上传: {} 个等待中的任务", pending.len());
        let round = RoundGuard::enter(&self.inner);
        for task_id in &pending {
            self.schedule(task_id);
        }

        self.wait_settled().await;
        drop(round);

        self.finish_round(!pending.is_empty())
    }

    /// 一轮上传收尾：发布 AllSettled、调用完成回调，全部成功时延迟请求关闭
    fn finish_round(&self, request_close: bool) -> Vec<UploadTask> {
        let snapshot = self.snapshot();
        let stats = UploadStats::from_tasks(&snapshot);
        info!(
            "上传结束: 成功 {}, 失败 {}, 取消 {}",
            stats.success, stats.error, stats.cancelled
        );
        self.inner.events.publish_upload(UploadEvent::AllSettled {
            succeeded: stats.success,
            failed: stats.error,
            cancelled: stats.cancelled,
        });

        let callback = self.inner.on_complete.read().clone();
        if let Some(callback) = callback {
            callback(&snapshot);
        }

        if request_close && stats.total > 0 && stats.success == stats.total {
            let events = self.inner.events.clone();
            let delay = self.inner.constraints.success_close_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                events.publish_upload(UploadEvent::CloseRequested);
            });
        }

        snapshot
    }

    /// 取消单个任务，已终结的任务不受影响
    pub fn cancel_upload(&self, task_id: &str) -> bool {
        let cancelled = self.transition(task_id, UploadTask::mark_cancelled);
        if cancelled {
            if let Some(run) = self.inner.runs.get(task_id) {
                run.cancel_token.cancel();
            }
            self.inner.throttler.forget(task_id);
            info!("取消上传任务: {}", task_id);
        }
        cancelled
    }

    /// 取消所有等待中 / 上传中的任务，返回取消数量
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self
            .inner
            .tasks
            .lock()
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        ids.iter().filter(|id| self.cancel_upload(id)).count()
    }

    /// 重试失败或已取消的任务
    ///
    /// 进度清零、重试次数加一后在后台重新上传；对其它状态的任务无效。
    /// 没有 upload_all 在等待时，重试全部终结后同样触发一次完成回调
    pub fn retry_upload(&self, task_id: &str) -> bool {
        if !self.transition(task_id, UploadTask::mark_retry) {
            debug!("任务不可重试: {}", task_id);
            return false;
        }
        self.inner.throttler.forget(task_id);
        info!("重试上传任务: {}", task_id);
        self.schedule(task_id);
        true
    }

    /// 移除任务，上传中的任务需先取消
    pub fn remove_file(&self, task_id: &str) -> bool {
        let removed = {
            let mut tasks = self.inner.tasks.lock();
            match tasks.iter().position(|t| t.id == task_id) {
                Some(idx) if tasks[idx].status == UploadStatus::Uploading => {
                    warn!("上传中的任务不能直接移除: {}", task_id);
                    false
                }
                Some(idx) => {
                    tasks.remove(idx);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.forget_task(task_id);
            self.inner.events.publish_upload(UploadEvent::Removed {
                task_id: task_id.to_string(),
            });
            info!("移除上传任务: {}", task_id);
        }
        removed
    }

    /// 移除所有已终结的任务，返回移除数量
    pub fn clear_completed(&self) -> usize {
        let removed: Vec<String> = {
            let mut tasks = self.inner.tasks.lock();
            let ids = tasks
                .iter()
                .filter(|t| t.status.is_terminal())
                .map(|t| t.id.clone())
                .collect();
            tasks.retain(|t| !t.status.is_terminal());
            ids
        };

        for task_id in &removed {
            self.forget_task(task_id);
            self.inner.events.publish_upload(UploadEvent::Removed {
                task_id: task_id.clone(),
            });
        }
        info!("清除已终结任务: {} 个", removed.len());
        removed.len()
    }

    /// 取消在途任务并清空队列
    pub fn reset(&self) {
        self.cancel_all();
        let removed: Vec<String> = {
            let mut tasks = self.inner.tasks.lock();
            tasks.drain(..).map(|t| t.id).collect()
        };
        for task_id in &removed {
            self.forget_task(task_id);
            self.inner.events.publish_upload(UploadEvent::Removed {
                task_id: task_id.clone(),
            });
        }
        info!("上传队列已重置");
    }

    /// 全部任务快照（入队顺序）
    pub fn snapshot(&self) -> Vec<UploadTask> {
        self.inner.tasks.lock().clone()
    }

    pub fn get_task(&self, task_id: &str) -> Option<UploadTask> {
        self.inner
            .tasks
            .lock()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    /// 所有任务进度的均值（四舍五入），空队列为 0
    pub fn overall_progress(&self) -> u8 {
        let tasks = self.inner.tasks.lock();
        if tasks.is_empty() {
            return 0;
        }
        let sum: u64 = tasks.iter().map(|t| t.progress as u64).sum();
        (sum as f64 / tasks.len() as f64).round() as u8
    }

    pub fn stats(&self) -> UploadStats {
        UploadStats::from_tasks(&self.inner.tasks.lock())
    }

    /// 是否有任务在上传
    pub fn is_uploading(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// 在任务上执行状态转换，成功时发布状态变更事件
    fn transition(&self, task_id: &str, f: impl FnOnce(&mut UploadTask) -> bool) -> bool {
        let change = {
            let mut tasks = self.inner.tasks.lock();
            let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
                return false;
            };
            let old = task.status;
            if !f(task) {
                return false;
            }
            (old, task.status)
        };

        self.inner.events.publish_upload(UploadEvent::StatusChanged {
            task_id: task_id.to_string(),
            old_status: change.0.as_str().to_string(),
            new_status: change.1.as_str().to_string(),
        });
        true
    }

    fn forget_task(&self, task_id: &str) {
        if let Some((_, run)) = self.inner.runs.remove(task_id) {
            run.cancel_token.cancel();
        }
        self.inner.throttler.forget(task_id);
    }

    /// 为任务登记一次运行并在后台执行
    fn schedule(&self, task_id: &str) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel_token = CancellationToken::new();

        match self.inner.runs.entry(task_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                // 旧运行已被取消或即将退出，由新运行接管
                occupied.get().cancel_token.cancel();
                occupied.insert(RunHandle {
                    generation,
                    cancel_token: cancel_token.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RunHandle {
                    generation,
                    cancel_token: cancel_token.clone(),
                });
            }
        }

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let manager = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            manager.run_task(&task_id, cancel_token).await;
            manager
                .inner
                .runs
                .remove_if(&task_id, |_, run| run.generation == generation);
            let (last, standalone) = {
                let waiting = manager.inner.waiting_rounds.lock();
                let last = manager.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1;
                (last, last && *waiting == 0)
            };
            if last {
                manager.inner.settled.notify_waiters();
            }
            if standalone {
                debug!("后台重试全部终结");
                manager.finish_round(true);
            }
        });
    }

    /// 单个任务的一次运行：等待许可 -> 上传 -> 记录结果
    async fn run_task(&self, task_id: &str, cancel_token: CancellationToken) {
        let semaphore = Arc::clone(&self.inner.semaphore);
        let _permit = tokio::select! {
            _ = cancel_token.cancelled() => return,
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        if cancel_token.is_cancelled() || !self.transition(task_id, UploadTask::mark_uploading) {
            return;
        }

        let Some(file) = self.get_task(task_id).map(|t| t.file) else {
            return;
        };
        debug!("任务开始上传: id={}, file={}", task_id, file.name);

        let on_progress = self.progress_callback(task_id, cancel_token.clone());
        let result = self
            .inner
            .transport
            .upload(&file, on_progress, cancel_token.clone())
            .await;

        // 取消后到达的结果一律丢弃，状态已由 cancel_upload 设置
        if cancel_token.is_cancelled() {
            return;
        }

        match result {
            Ok(document) => {
                let document_id = document.id.clone();
                if self.transition(task_id, |t| t.mark_success(document)) {
                    self.inner.events.publish_upload(UploadEvent::Completed {
                        task_id: task_id.to_string(),
                        document_id,
                    });
                }
            }
            Err(TransportError::Cancelled) => {
                self.transition(task_id, UploadTask::mark_cancelled);
            }
            Err(TransportError::Failed(message)) => {
                warn!("任务上传失败: id={}, error={}", task_id, message);
                if self.transition(task_id, |t| t.mark_failed(message.clone())) {
                    self.inner.events.publish_upload(UploadEvent::Failed {
                        task_id: task_id.to_string(),
                        error: message,
                    });
                }
            }
        }
        self.inner.throttler.forget(task_id);
    }

    /// 把传输层进度写回任务；total 未知时不更新
    fn progress_callback(&self, task_id: &str, cancel_token: CancellationToken) -> ProgressCallback {
        let inner = Arc::clone(&self.inner);
        let task_id = task_id.to_string();
        Arc::new(move |progress: UploadProgress| {
            if cancel_token.is_cancelled() {
                return;
            }
            let Some(percent) = progress.percent() else {
                return;
            };
            let updated = {
                let mut tasks = inner.tasks.lock();
                tasks
                    .iter_mut()
                    .find(|t| t.id == task_id)
                    .and_then(|t| t.update_progress(percent).then_some(t.progress))
            };
            if let Some(progress) = updated {
                if inner.throttler.should_emit(&task_id, progress) {
                    inner.events.publish_upload(UploadEvent::Progress {
                        task_id: task_id.clone(),
                        progress,
                    });
                }
            }
        })
    }

    /// 等待在途运行数归零
    async fn wait_settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
