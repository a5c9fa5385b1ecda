// compliance-backend/src/service/job_runner.rs

//! バックグラウンドジョブの実行
//!
//! 呼び出し元はジョブを登録したらすぐに戻る。結果は各リクエスト行のステータスでのみ観測できる。
//! 一時的なエラーは指数バックオフで再試行し、最終的に失敗した場合は `on_exhausted` を実行する。

use crate::error::{AppError, AppResult};
use crate::utils::transaction::{calculate_delay, should_retry, BoxFuture, RetryConfig};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, AppResult<()>> + Send + Sync>;
type ExhaustedFn = Box<dyn FnOnce(AppError) -> BoxFuture<'static, ()> + Send>;

struct Job {
    name: String,
    task: TaskFn,
    on_exhausted: ExhaustedFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// tokio タスクとして即座に実行
    Immediate,
    /// `run_deferred` が呼ばれるまでキューに溜める
    Deferred,
}

pub struct JobRunner {
    retry: RetryConfig,
    mode: DispatchMode,
    queue: Mutex<Vec<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobRunner {
    pub fn new(retry: RetryConfig) -> Self {
        Self::with_mode(retry, DispatchMode::Immediate)
    }

    pub fn deferred(retry: RetryConfig) -> Self {
        Self::with_mode(retry, DispatchMode::Deferred)
    }

    pub fn with_mode(retry: RetryConfig, mode: DispatchMode) -> Self {
        Self {
            retry,
            mode,
            queue: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// ジョブを登録する
    pub fn dispatch<F, Fut, E, EFut>(&self, name: impl Into<String>, task: F, on_exhausted: E)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
        E: FnOnce(AppError) -> EFut + Send + 'static,
        EFut: Future<Output = ()> + Send + 'static,
    {
        let job = Job {
            name: name.into(),
            task: Arc::new(move || Box::pin(task())),
            on_exhausted: Box::new(move |err| Box::pin(on_exhausted(err))),
        };

        debug!(job = %job.name, mode = ?self.mode, "Job dispatched");

        match self.mode {
            DispatchMode::Immediate => {
                let retry = self.retry.clone();
                let handle = tokio::spawn(run_job(job, retry));
                if let Ok(mut handles) = self.handles.lock() {
                    handles.retain(|h| !h.is_finished());
                    handles.push(handle);
                }
            }
            DispatchMode::Deferred => {
                if let Ok(mut queue) = self.queue.lock() {
                    queue.push(job);
                }
            }
        }
    }

    /// キューに溜まったジョブを登録順に実行し、実行した件数を返す
    pub async fn run_deferred(&self) -> usize {
        let mut executed = 0;
        loop {
            // ジョブ内で新たに登録されたものも含めて空になるまで実行
            let jobs: Vec<Job> = match self.queue.lock() {
                Ok(mut queue) => queue.drain(..).collect(),
                Err(_) => Vec::new(),
            };
            if jobs.is_empty() {
                break;
            }
            for job in jobs {
                run_job(job, self.retry.clone()).await;
                executed += 1;
            }
        }
        executed
    }

    /// 実行中のジョブがすべて終わるまで待つ
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => Vec::new(),
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Background job panicked");
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

/// 1回分の実行。パニックは失敗として扱い、再試行せずに `on_exhausted` へ回す
async fn run_attempt(name: &str, task: &TaskFn) -> AppResult<()> {
    match tokio::spawn(task()).await {
        Ok(result) => result,
        Err(join_error) => {
            error!(job = %name, error = %join_error, "Background job panicked");
            Err(AppError::InternalServerError(format!(
                "Job {} panicked",
                name
            )))
        }
    }
}

async fn run_job(job: Job, retry: RetryConfig) {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match run_attempt(&job.name, &job.task).await {
            Ok(()) => {
                info!(job = %job.name, attempt, "Job completed");
                return;
            }
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = calculate_delay(attempt, &retry);
                warn!(
                    job = %job.name,
                    attempt,
                    delay_ms = delay,
                    error = %err,
                    "Job failed with transient error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => {
                error!(job = %job.name, attempt, error = %err, "Job failed permanently");
                (job.on_exhausted)(err).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let runner = JobRunner::new(fast_retry(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let exhausted = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let exhausted_counter = exhausted.clone();
        runner.dispatch(
            "flaky",
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::ExternalServiceError("storage".into()))
                    } else {
                        Ok(())
                    }
                }
            },
            move |_| async move {
                exhausted_counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        runner.wait_idle().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(exhausted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permanent_error_runs_exhausted_handler_once() {
        let runner = JobRunner::new(fast_retry(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let exhausted = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let exhausted_counter = exhausted.clone();
        runner.dispatch(
            "broken",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::NotFound("user".into()))
                }
            },
            move |err| async move {
                assert!(matches!(err, AppError::NotFound(_)));
                exhausted_counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        runner.wait_idle().await;

        // NotFound は再試行しない
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_runs_exhausted_handler() {
        let runner = JobRunner::deferred(fast_retry(3));
        let exhausted = Arc::new(AtomicU32::new(0));

        let exhausted_counter = exhausted.clone();
        runner.dispatch(
            "panicking",
            || async {
                if true {
                    panic!("unexpected state");
                }
                Ok(())
            },
            move |err| async move {
                assert!(matches!(err, AppError::InternalServerError(_)));
                exhausted_counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(runner.run_deferred().await, 1);
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deferred_mode_waits_for_run() {
        let runner = JobRunner::deferred(fast_retry(1));
        let runs = Arc::new(AtomicU32::new(0));

        let counter = runs.clone();
        runner.dispatch(
            "deferred",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            |_| async {},
        );

        assert_eq!(runner.pending_count(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(runner.run_deferred().await, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(runner.run_deferred().await, 0);
    }
}
