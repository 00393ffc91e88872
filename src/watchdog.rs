/// Resilient supervisor for external scanner processes.
///
/// One logical invocation runs up to `max_retries + 1` sequential attempts.
/// Each attempt spawns the command in its own process group, streams its
/// combined stdout/stderr into `<base>.attempt<N>.log` while it runs, and
/// races two independent deadlines: a total wall-clock limit and an idle
/// (no-output) limit. Failed or killed attempts retry after exponential
/// backoff. Callers get back only a success flag and the final log path;
/// the log itself carries the reason an attempt ended.
use crate::container::is_container_runtime;
use crate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Monitor poll interval while an attempt is running.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

type SharedLog = Arc<Mutex<tokio::fs::File>>;

/// One supervised command plus its timeout and retry parameters.
/// Immutable once handed to [`run_with_watchdog`].
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program and arguments, program first.
    pub argv: Vec<String>,
    /// Attempt logs are written next to this base as
    /// `<output_base>.attempt<N>.log`, N starting at 1.
    pub output_base: PathBuf,
    /// Kill an attempt after this many seconds of wall-clock time
    /// (0 = disabled).
    pub total_timeout_secs: u64,
    /// Kill an attempt after this many seconds without any output
    /// (0 = disabled).
    pub idle_timeout_secs: u64,
    /// Additional attempts allowed after the first.
    pub max_retries: u32,
    /// Base for exponential backoff between attempts.
    pub backoff_base_secs: i64,
    /// Niceness increment for the child; skipped for container-runtime
    /// commands, best-effort everywhere else.
    pub niceness: i32,
}

impl Invocation {
    /// An invocation with the default retry profile: two retries, 5 s
    /// backoff base, niceness 10, no timeouts.
    pub fn new(argv: Vec<String>, output_base: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            output_base: output_base.into(),
            total_timeout_secs: 0,
            idle_timeout_secs: 0,
            max_retries: 2,
            backoff_base_secs: 5,
            niceness: 10,
        }
    }

    /// Set both deadlines in one call.
    pub fn with_timeouts(mut self, total_secs: u64, idle_secs: u64) -> Self {
        self.total_timeout_secs = total_secs;
        self.idle_timeout_secs = idle_secs;
        self
    }
}

/// The only value surfaced past the supervisor boundary.
#[derive(Debug, Clone)]
pub struct WatchdogResult {
    /// True iff some attempt's process exited with status 0.
    pub success: bool,
    /// Log of the successful attempt, or of the last attempt when all
    /// were exhausted.
    pub log_path: PathBuf,
}

/// Errors that can occur before an attempt's process is even spawned.
/// Runtime failures (spawn errors, timeouts, nonzero exits) are attempt
/// outcomes, not errors; they surface only through `WatchdogResult`.
#[derive(Debug)]
pub enum WatchdogError {
    /// The invocation's argv was empty.
    EmptyCommand,
    /// Failed to create an attempt's log file.
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogError::EmptyCommand => write!(f, "invocation has an empty command line"),
            WatchdogError::LogFile { path, source } => {
                write!(f, "failed to create log file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WatchdogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchdogError::EmptyCommand => None,
            WatchdogError::LogFile { source, .. } => Some(source),
        }
    }
}

/// Terminal state of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Succeeded,
    ProcessError,
    KilledTotalTimeout,
    KilledIdleTimeout,
    SpawnFailed,
}

/// What the monitor loop observed before it stopped polling.
enum MonitorVerdict {
    Exited(std::process::ExitStatus),
    TotalTimeout,
    IdleTimeout,
    WaitFailed(std::io::Error),
}

/// Arrival time of the most recent output chunk, shared between the
/// reader tasks and the monitor loop. Stored as milliseconds since the
/// attempt epoch so both sides touch a single atomic, never a lock.
struct Heartbeat {
    epoch: Instant,
    last_output_ms: AtomicU64,
}

impl Heartbeat {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_output_ms: AtomicU64::new(0),
        }
    }

    /// Record that output just arrived.
    fn beat(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_output_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the last output chunk (or since the attempt started,
    /// if nothing has arrived yet).
    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_output_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}

/// Drains a child's stdout/stderr pipes into the attempt log, flushing
/// after each chunk and beating the shared heartbeat on every chunk.
struct OutputStreamer {
    readers: Vec<JoinHandle<()>>,
}

impl OutputStreamer {
    fn start(child: &mut Child, log: &SharedLog, heartbeat: &Arc<Heartbeat>) -> Self {
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(Self::pump(stdout, Arc::clone(log), Arc::clone(heartbeat)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Self::pump(stderr, Arc::clone(log), Arc::clone(heartbeat)));
        }
        Self { readers }
    }

    fn pump<R>(mut stream: R, log: SharedLog, heartbeat: Arc<Heartbeat>) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        heartbeat.beat();
                        let mut log = log.lock().await;
                        if let Err(e) = log.write_all(&buf[..n]).await {
                            tracing::warn!(error = %e, "failed to write captured output");
                            break;
                        }
                        let _ = log.flush().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read child output");
                        break;
                    }
                }
            }
        })
    }

    /// Wait for both pipes to reach EOF so the log holds every byte the
    /// process wrote before it exited or was killed.
    async fn drain(self) {
        for reader in self.readers {
            let _ = reader.await;
        }
    }
}

/// Run `invocation` under the watchdog, retrying failed or stalled
/// attempts with exponential backoff. Blocks the caller until the
/// invocation resolves one way or the other.
pub async fn run_with_watchdog(invocation: &Invocation) -> Result<WatchdogResult, WatchdogError> {
    if invocation.argv.is_empty() {
        return Err(WatchdogError::EmptyCommand);
    }

    let policy = RetryPolicy::new(invocation.max_retries, invocation.backoff_base_secs);
    let mut log_path = attempt_log_path(&invocation.output_base, 1);

    for attempt in 1..=policy.max_attempts() {
        log_path = attempt_log_path(&invocation.output_base, attempt);
        tracing::info!(
            command = %invocation.argv[0],
            attempt,
            log = %log_path.display(),
            "starting supervised attempt"
        );

        let outcome = run_attempt(invocation, &log_path).await?;
        if outcome == AttemptOutcome::Succeeded {
            tracing::info!(attempt, "command succeeded");
            return Ok(WatchdogResult {
                success: true,
                log_path,
            });
        }

        if policy.should_retry(attempt) {
            let delay = policy.delay_before(attempt + 1);
            tracing::warn!(
                attempt,
                ?outcome,
                delay_secs = delay.as_secs(),
                "attempt failed, backing off before retry"
            );
            tokio::time::sleep(delay).await;
        } else {
            tracing::warn!(
                attempts = policy.max_attempts(),
                ?outcome,
                "all attempts exhausted"
            );
        }
    }

    Ok(WatchdogResult {
        success: false,
        log_path,
    })
}

/// Log path for one attempt: `<base>.attempt<N>.log`.
fn attempt_log_path(base: &Path, attempt: u32) -> PathBuf {
    PathBuf::from(format!("{}.attempt{}.log", base.display(), attempt))
}

/// Run a single attempt to completion and classify how it ended.
async fn run_attempt(
    invocation: &Invocation,
    log_path: &Path,
) -> Result<AttemptOutcome, WatchdogError> {
    let log = tokio::fs::File::create(log_path)
        .await
        .map_err(|e| WatchdogError::LogFile {
            path: log_path.to_path_buf(),
            source: e,
        })?;
    let log: SharedLog = Arc::new(Mutex::new(log));

    let mut command = Command::new(&invocation.argv[0]);
    command
        .args(&invocation.argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0); // own group so a kill takes the whole tree

    // Lower the child's priority before exec. Renicing a container
    // runtime client is pointless, and a failed nice() never fails the
    // attempt.
    if invocation.niceness != 0 && !is_container_runtime(&invocation.argv[0]) {
        let niceness = invocation.niceness;
        unsafe {
            command.pre_exec(move || {
                let _ = nix::libc::nice(niceness);
                Ok(())
            });
        }
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(command = %invocation.argv[0], error = %e, "failed to spawn command");
            append_marker(&log, &format!("=== SPAWN FAILED: {e} ===\n")).await;
            return Ok(AttemptOutcome::SpawnFailed);
        }
    };

    let heartbeat = Arc::new(Heartbeat::new());
    let streamer = OutputStreamer::start(&mut child, &log, &heartbeat);
    let started = Instant::now();
    let total_limit = Duration::from_secs(invocation.total_timeout_secs);
    let idle_limit = Duration::from_secs(invocation.idle_timeout_secs);

    // Monitor loop: exited > total deadline > idle deadline, checked in
    // that order each tick. Total timeout wins a tie.
    let verdict = loop {
        match child.try_wait() {
            Ok(Some(status)) => break MonitorVerdict::Exited(status),
            Ok(None) => {}
            Err(e) => break MonitorVerdict::WaitFailed(e),
        }
        if !total_limit.is_zero() && started.elapsed() > total_limit {
            break MonitorVerdict::TotalTimeout;
        }
        if !idle_limit.is_zero() && heartbeat.idle_for() > idle_limit {
            break MonitorVerdict::IdleTimeout;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    let outcome = match verdict {
        MonitorVerdict::Exited(status) => {
            streamer.drain().await;
            if status.success() {
                AttemptOutcome::Succeeded
            } else {
                tracing::warn!(exit_code = ?status.code(), "command exited with failure");
                AttemptOutcome::ProcessError
            }
        }
        MonitorVerdict::TotalTimeout => {
            tracing::warn!(
                limit_secs = invocation.total_timeout_secs,
                "total timeout exceeded, killing command"
            );
            kill_child(&mut child).await;
            streamer.drain().await;
            append_marker(
                &log,
                &format!(
                    "\n=== KILLED: total timeout {}s exceeded ===\n",
                    invocation.total_timeout_secs
                ),
            )
            .await;
            AttemptOutcome::KilledTotalTimeout
        }
        MonitorVerdict::IdleTimeout => {
            tracing::warn!(
                limit_secs = invocation.idle_timeout_secs,
                "no output within idle limit, killing command"
            );
            kill_child(&mut child).await;
            streamer.drain().await;
            append_marker(
                &log,
                &format!(
                    "\n=== KILLED: no output for {}s ===\n",
                    invocation.idle_timeout_secs
                ),
            )
            .await;
            AttemptOutcome::KilledIdleTimeout
        }
        MonitorVerdict::WaitFailed(e) => {
            tracing::warn!(error = %e, "failed to poll command status");
            kill_child(&mut child).await;
            streamer.drain().await;
            append_marker(&log, &format!("\n=== WAIT FAILED: {e} ===\n")).await;
            AttemptOutcome::ProcessError
        }
    };

    // `log` is the last live handle now that the readers are drained;
    // dropping it closes the file before the next attempt opens its own.
    Ok(outcome)
}

/// Kill the child's whole process group, falling back to the direct
/// handle if the group signal cannot be delivered. Best effort; the
/// attempt outcome is already decided.
async fn kill_child(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
            let _ = child.wait().await;
            return;
        }
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill command");
    }
}

async fn append_marker(log: &SharedLog, marker: &str) {
    let mut log = log.lock().await;
    if let Err(e) = log.write_all(marker.as_bytes()).await {
        tracing::warn!(error = %e, "failed to append log marker");
    }
    let _ = log.flush().await;
}
