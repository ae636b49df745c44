//! Supervisor side of the chunk protocol: a pool of worker processes.
//!
//! The pool does not bound concurrency itself. The supervisor drives it
//! through `buffer_unordered(n)`, so at most `n` calls to [`WorkerPool::run`]
//! are in flight and at most `n` workers are alive. A call takes an idle
//! worker or spawns a fresh one, and hands it back only after a clean reply.
//! A worker that exits or answers with garbage is dropped and the next call
//! replaces it.
//!
//! Every child is spawned with `kill_on_drop`. Dropping an in-flight `run`
//! future, which is what cancellation does, kills its worker.

use crate::config::WorkerLaunch;
use crate::error::{ChunkError, PdfStructError};
use crate::output::{ChunkResult, PageFragment};
use crate::pipeline::stages::StageSet;
use crate::pipeline::worker::{process_chunk, ChunkRequest, WorkerReply, WORKER_ENV};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// How long to wait for a worker to exit after its pipes close.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// One live worker process.
struct ProcessWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessWorker {
    fn spawn(program: &Path, args: &[String]) -> Result<Self, ChunkError> {
        let spawn_failed = |detail: String| ChunkError::SpawnFailed { detail };
        let mut child = Command::new(program)
            .args(args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_failed(format!("{}: {e}", program.display())))?;
        let stdin = child.stdin.take().ok_or_else(|| spawn_failed("no stdin pipe".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| spawn_failed("no stdout pipe".into()))?;
        debug!(pid = child.id(), program = %program.display(), "worker spawned");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn call(&mut self, request: &ChunkRequest) -> Result<WorkerReply, ChunkError> {
        let mut line = serde_json::to_string(request).map_err(|e| ChunkError::Protocol {
            detail: format!("request encoding: {e}"),
        })?;
        line.push('\n');
        if self.stdin.write_all(line.as_bytes()).await.is_err() || self.stdin.flush().await.is_err() {
            return Err(self.exited().await);
        }

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply).await {
            Ok(0) => Err(self.exited().await),
            Ok(_) => {
                let reply: WorkerReply = serde_json::from_str(&reply).map_err(|e| ChunkError::Protocol {
                    detail: format!("unparsable reply: {e}"),
                })?;
                if (reply.start_page, reply.end_page) != (request.start_page, request.end_page) {
                    return Err(ChunkError::Protocol {
                        detail: format!(
                            "reply for pages {}-{} to a request for {}-{}",
                            reply.start_page, reply.end_page, request.start_page, request.end_page
                        ),
                    });
                }
                Ok(reply)
            }
            Err(e) => Err(ChunkError::Protocol {
                detail: format!("reading reply: {e}"),
            }),
        }
    }

    async fn exited(&mut self) -> ChunkError {
        let status = match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("unknown: {e}"),
            Err(_) => "unresponsive".to_string(),
        };
        ChunkError::WorkerExited { status }
    }

    async fn shutdown(mut self) {
        drop(self.stdin);
        if tokio::time::timeout(EXIT_GRACE, self.child.wait()).await.is_err() {
            warn!(pid = self.child.id(), "worker ignored shutdown, killing");
            let _ = self.child.kill().await;
        }
    }
}

enum Backend {
    Process { program: PathBuf, args: Vec<String> },
    InProcess,
}

/// Runs chunk requests on worker processes, or in-process when configured.
pub struct WorkerPool {
    backend: Backend,
    idle: Mutex<Vec<ProcessWorker>>,
    stages: Mutex<Option<Arc<StageSet>>>,
}

impl WorkerPool {
    pub fn new(launch: &WorkerLaunch) -> Result<Self, PdfStructError> {
        let backend = match launch {
            WorkerLaunch::CurrentExe => Backend::Process {
                program: std::env::current_exe()
                    .map_err(|e| PdfStructError::Internal(format!("cannot locate current executable: {e}")))?,
                args: Vec::new(),
            },
            WorkerLaunch::Process { program, args } => Backend::Process {
                program: program.clone(),
                args: args.clone(),
            },
            WorkerLaunch::InProcess => Backend::InProcess,
        };
        Ok(Self {
            backend,
            idle: Mutex::new(Vec::new()),
            stages: Mutex::new(None),
        })
    }

    /// Use `stages` for in-process chunks whose settings match it.
    pub fn with_stages(self, stages: StageSet) -> Self {
        *self.stages.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(stages));
        self
    }

    /// Process one chunk. Never fails; a failure is carried in the result.
    pub async fn run(&self, request: ChunkRequest) -> ChunkResult {
        let started = Instant::now();
        let (start_page, end_page) = (request.start_page, request.end_page);
        let outcome = match &self.backend {
            Backend::Process { program, args } => self.run_in_worker(program, args, &request).await,
            Backend::InProcess => self.run_in_process(request).await,
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(pages) => ChunkResult {
                start_page,
                end_page,
                pages,
                error: None,
                duration_ms,
            },
            Err(e) => {
                warn!(start_page, end_page, error = %e, "chunk failed");
                ChunkResult::failed(start_page, end_page, e, duration_ms)
            }
        }
    }

    async fn run_in_worker(
        &self,
        program: &Path,
        args: &[String],
        request: &ChunkRequest,
    ) -> Result<Vec<PageFragment>, ChunkError> {
        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let mut worker = match idle {
            Some(w) => w,
            None => ProcessWorker::spawn(program, args)?,
        };
        // on error the worker is dropped here, which kills it
        let reply = worker.call(request).await?;
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(worker);
        reply.result
    }

    async fn run_in_process(&self, request: ChunkRequest) -> Result<Vec<PageFragment>, ChunkError> {
        let stages = self.stages_for(&request)?;
        tokio::task::spawn_blocking(move || process_chunk(&request, &stages))
            .await
            .map_err(|e| ChunkError::WorkerExited {
                status: format!("in-process worker panicked: {e}"),
            })?
    }

    fn stages_for(&self, request: &ChunkRequest) -> Result<Arc<StageSet>, ChunkError> {
        let mut slot = self.stages.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stages) = slot.as_ref().filter(|s| s.settings() == &request.settings) {
            return Ok(Arc::clone(stages));
        }
        let stages = Arc::new(StageSet::from_settings(&request.settings).map_err(|e| ChunkError::Protocol {
            detail: format!("invalid settings: {e}"),
        })?);
        *slot = Some(Arc::clone(&stages));
        Ok(stages)
    }

    /// Number of idle worker processes.
    pub fn idle_workers(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Close every idle worker's input and wait for it to exit.
    pub async fn shutdown(&self) {
        let workers: Vec<ProcessWorker> = std::mem::take(&mut *self.idle.lock().unwrap_or_else(PoisonError::into_inner));
        if workers.is_empty() {
            return;
        }
        info!(workers = workers.len(), "shutting down worker pool");
        futures::future::join_all(workers.into_iter().map(ProcessWorker::shutdown)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionSettings, OcrMode};

    fn request(dir: &std::path::Path) -> ChunkRequest {
        let mut settings = ExtractionSettings::default();
        settings.ocr.mode = OcrMode::Off;
        ChunkRequest {
            chunk_path: dir.join("pdfstruct_tok_chunk.pdf"),
            start_page: 5,
            end_page: 6,
            settings,
            asset_dir: None,
        }
    }

    fn shell(script: &str) -> WorkerLaunch {
        WorkerLaunch::Process {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(&WorkerLaunch::Process {
            program: PathBuf::from("/definitely/not/a/worker"),
            args: vec![],
        })
        .unwrap();
        let result = pool.run(request(dir.path())).await;
        assert!(matches!(result.error, Some(ChunkError::SpawnFailed { .. })));
        assert_eq!((result.start_page, result.end_page), (5, 6));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dead_worker_is_reported_and_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(&shell("exit 3")).unwrap();
        let result = pool.run(request(dir.path())).await;
        assert!(matches!(result.error, Some(ChunkError::WorkerExited { .. })));
        assert!(result.markdown(&Default::default()).starts_with("[ERROR: Failed to process pages 5-6:"));
        assert_eq!(pool.idle_workers(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn garbage_reply_is_a_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(&shell("read line; echo hello")).unwrap();
        let result = pool.run(request(dir.path())).await;
        assert!(matches!(result.error, Some(ChunkError::Protocol { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_reply_returns_worker_to_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let reply = WorkerReply {
            start_page: 5,
            end_page: 6,
            result: Ok(vec![
                PageFragment {
                    page: 5,
                    markdown: "five".into(),
                    ..Default::default()
                },
                PageFragment {
                    page: 6,
                    markdown: "six".into(),
                    ..Default::default()
                },
            ]),
        };
        let line = serde_json::to_string(&reply).unwrap();
        let script = format!("while read line; do printf '%s\\n' '{line}'; done");
        let pool = WorkerPool::new(&shell(&script)).unwrap();

        let first = pool.run(request(dir.path())).await;
        assert!(first.is_ok(), "{:?}", first.error);
        assert_eq!(first.pages.len(), 2);
        assert_eq!(pool.idle_workers(), 1);

        let second = pool.run(request(dir.path())).await;
        assert!(second.is_ok());
        assert_eq!(pool.idle_workers(), 1);

        pool.shutdown().await;
        assert_eq!(pool.idle_workers(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_a_run_kills_its_worker() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(&shell("sleep 30")).unwrap();
        let outcome = tokio::time::timeout(Duration::from_millis(200), pool.run(request(dir.path()))).await;
        assert!(outcome.is_err(), "a sleeping worker cannot reply");
        assert_eq!(pool.idle_workers(), 0);
    }

    #[tokio::test]
    async fn in_process_chunk_failure_becomes_a_marker() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        std::fs::write(&req.chunk_path, b"not a pdf").unwrap();
        let pool = WorkerPool::new(&WorkerLaunch::InProcess).unwrap();
        let result = pool.run(req.clone()).await;
        assert!(matches!(result.error, Some(ChunkError::OpenFailed { .. })));
        assert!(!req.chunk_path.exists(), "chunk file removed by the worker");
    }
}
