/// Engagement orchestration: nmap first, then per-port follow-up tools,
/// then the AI report. Every external command goes through the watchdog;
/// only nmap is fatal when it fails, everything downstream is logged and
/// skipped.
use crate::advisor;
use crate::config::RedfoxConfig;
use crate::container::ContainerError;
use crate::project::ProjectDir;
use crate::report;
use crate::tools;
use crate::watchdog::{run_with_watchdog, Invocation, WatchdogError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Follow-up scanners dispatched when a well-known port is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    Hydra,
    Gobuster,
    Nikto { ssl: bool },
}

/// Static dispatch table: open port to the tools worth running against it.
fn follow_ups(port: u16) -> &'static [FollowUp] {
    match port {
        21 => &[FollowUp::Hydra],
        80 => &[FollowUp::Gobuster, FollowUp::Nikto { ssl: false }],
        443 => &[FollowUp::Nikto { ssl: true }],
        _ => &[],
    }
}

/// Outcome of one follow-up tool run, kept for the prompt and the summary.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRun {
    pub tool: String,
    pub port: u16,
    pub success: bool,
    pub log_path: PathBuf,
    /// Captured output; lives in the log file, so the JSON summary skips it.
    #[serde(skip)]
    pub output: String,
}

/// Machine-readable record of a finished engagement, written to
/// `summary.json` next to the report.
#[derive(Debug, Serialize)]
pub struct EngagementSummary {
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub nmap_log: PathBuf,
    pub open_ports: Vec<u16>,
    pub tools: Vec<ToolRun>,
    pub report: Option<PathBuf>,
}

/// Errors that abort an engagement.
#[derive(Debug)]
pub enum PentestError {
    /// Could not create the project directory.
    Project { source: std::io::Error },
    /// Could not assemble the nmap container command.
    Container(ContainerError),
    /// The nmap invocation could not be supervised.
    Watchdog(WatchdogError),
    /// Every nmap attempt failed; nothing to dispatch on.
    NmapFailed { log_path: PathBuf },
    /// The summary could not be serialized.
    SummaryJson { source: serde_json::Error },
    /// The summary could not be written.
    SummaryIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for PentestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PentestError::Project { source } => {
                write!(f, "failed to create project directory: {source}")
            }
            PentestError::Container(e) => write!(f, "bad container command: {e}"),
            PentestError::Watchdog(e) => write!(f, "nmap supervision failed: {e}"),
            PentestError::NmapFailed { log_path } => {
                write!(f, "nmap failed on all attempts, see {}", log_path.display())
            }
            PentestError::SummaryJson { source } => {
                write!(f, "failed to serialize summary: {source}")
            }
            PentestError::SummaryIo { path, source } => {
                write!(f, "failed to write summary {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PentestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PentestError::Project { source } => Some(source),
            PentestError::Container(e) => Some(e),
            PentestError::Watchdog(e) => Some(e),
            PentestError::NmapFailed { .. } => None,
            PentestError::SummaryJson { source } => Some(source),
            PentestError::SummaryIo { source, .. } => Some(source),
        }
    }
}

impl From<ContainerError> for PentestError {
    fn from(e: ContainerError) -> Self {
        PentestError::Container(e)
    }
}

impl From<WatchdogError> for PentestError {
    fn from(e: WatchdogError) -> Self {
        PentestError::Watchdog(e)
    }
}

/// Run a full engagement against `target` into `project`.
pub async fn run_pentest(
    config: &RedfoxConfig,
    project: &ProjectDir,
    target: &str,
) -> Result<EngagementSummary, PentestError> {
    let started_at = Utc::now();
    project
        .init()
        .map_err(|e| PentestError::Project { source: e })?;
    let runtime = config.container.enabled.then_some(&config.container);

    tracing::info!(target, "running nmap");
    let argv = tools::nmap::command(target, &config.nmap, runtime)?;
    let nmap = run_with_watchdog(&build_invocation(
        config,
        argv,
        project.scan_base("nmap"),
        config.nmap.total_timeout_secs,
        config.nmap.idle_timeout_secs,
    ))
    .await?;
    if !nmap.success {
        return Err(PentestError::NmapFailed {
            log_path: nmap.log_path,
        });
    }

    let nmap_output = read_log(&nmap.log_path);
    let open_ports = tools::nmap::parse_open_ports(&nmap_output);
    tracing::info!(?open_ports, "nmap finished");

    let mut tool_runs: Vec<ToolRun> = Vec::new();
    for &port in &open_ports {
        for follow_up in follow_ups(port) {
            let (tool, argv) = match follow_up {
                FollowUp::Hydra => (
                    "hydra",
                    tools::hydra::command(target, port, &config.hydra, &config.wordlists, runtime),
                ),
                FollowUp::Gobuster => (
                    "gobuster",
                    tools::gobuster::command(
                        target,
                        port,
                        &config.gobuster,
                        &config.wordlists,
                        runtime,
                    ),
                ),
                FollowUp::Nikto { ssl } => (
                    "nikto",
                    tools::nikto::command(target, port, *ssl, &config.nikto, runtime),
                ),
            };
            let (total, idle) = tool_timeouts(config, follow_up);
            tracing::info!(tool, port, "running follow-up tool");
            if let Some(run) = run_tool(config, project, tool, port, argv, total, idle).await {
                tool_runs.push(run);
            }
        }
    }

    let mut report_path = None;
    if let Some(model) = config.ai.model.as_deref() {
        let reportable: Vec<ToolRun> = tool_runs
            .iter()
            .filter(|run| run.success && !run.output.trim().is_empty())
            .cloned()
            .collect();
        let prompt = advisor::build_prompt(target, &nmap_output, &reportable);
        match advisor::ask(
            model,
            &prompt,
            project,
            &config.ai,
            &config.watchdog,
            config.container.enabled,
        )
        .await
        {
            Ok(fragment) => {
                let path = project.report();
                match report::save_report(&path, "Pentest Report", &fragment) {
                    Ok(()) => report_path = Some(path),
                    Err(e) => tracing::error!(error = %e, "failed to save report"),
                }
            }
            // a lost report never loses the scan data already on disk
            Err(e) => tracing::error!(error = %e, "AI guidance failed"),
        }
    } else {
        tracing::info!("no model configured, skipping AI report");
    }

    let summary = EngagementSummary {
        target: target.to_string(),
        started_at,
        finished_at: Utc::now(),
        nmap_log: nmap.log_path,
        open_ports,
        tools: tool_runs,
        report: report_path,
    };
    write_summary(project, &summary)?;
    Ok(summary)
}

/// Run one follow-up tool; any failure is logged and skipped, never fatal.
async fn run_tool(
    config: &RedfoxConfig,
    project: &ProjectDir,
    tool: &str,
    port: u16,
    argv: Result<Vec<String>, ContainerError>,
    total_timeout_secs: u64,
    idle_timeout_secs: u64,
) -> Option<ToolRun> {
    let argv = match argv {
        Ok(argv) => argv,
        Err(e) => {
            tracing::warn!(tool, port, error = %e, "bad tool command, skipping");
            return None;
        }
    };
    let base = project.scan_base(&format!("{tool}-{port}"));
    let invocation = build_invocation(config, argv, base, total_timeout_secs, idle_timeout_secs);
    match run_with_watchdog(&invocation).await {
        Ok(result) => {
            if !result.success {
                tracing::warn!(tool, port, log = %result.log_path.display(), "tool failed");
            }
            let output = read_log(&result.log_path);
            Some(ToolRun {
                tool: tool.to_string(),
                port,
                success: result.success,
                log_path: result.log_path,
                output,
            })
        }
        Err(e) => {
            tracing::warn!(tool, port, error = %e, "tool could not be supervised, skipping");
            None
        }
    }
}

fn build_invocation(
    config: &RedfoxConfig,
    argv: Vec<String>,
    output_base: PathBuf,
    total_timeout_secs: u64,
    idle_timeout_secs: u64,
) -> Invocation {
    let mut invocation =
        Invocation::new(argv, output_base).with_timeouts(total_timeout_secs, idle_timeout_secs);
    invocation.max_retries = config.watchdog.max_retries;
    invocation.backoff_base_secs = config.watchdog.backoff_base_secs;
    invocation.niceness = config.watchdog.niceness;
    invocation
}

fn tool_timeouts(config: &RedfoxConfig, follow_up: &FollowUp) -> (u64, u64) {
    match follow_up {
        FollowUp::Hydra => (
            config.hydra.total_timeout_secs,
            config.hydra.idle_timeout_secs,
        ),
        FollowUp::Gobuster => (
            config.gobuster.total_timeout_secs,
            config.gobuster.idle_timeout_secs,
        ),
        FollowUp::Nikto { .. } => (
            config.nikto.total_timeout_secs,
            config.nikto.idle_timeout_secs,
        ),
    }
}

/// Read a captured log back, tolerating non-UTF-8 scanner output.
fn read_log(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read captured log");
            String::new()
        }
    }
}

fn write_summary(project: &ProjectDir, summary: &EngagementSummary) -> Result<(), PentestError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| PentestError::SummaryJson { source: e })?;
    let path = project.summary();
    std::fs::write(&path, json).map_err(|e| PentestError::SummaryIo {
        path: path.clone(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "summary saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_ups_table() {
        assert_eq!(follow_ups(21), &[FollowUp::Hydra]);
        assert_eq!(
            follow_ups(80),
            &[FollowUp::Gobuster, FollowUp::Nikto { ssl: false }]
        );
        assert_eq!(follow_ups(443), &[FollowUp::Nikto { ssl: true }]);
        assert!(follow_ups(22).is_empty());
        assert!(follow_ups(8080).is_empty());
    }

    #[test]
    fn test_read_log_missing_file_is_empty() {
        assert_eq!(read_log(Path::new("/nonexistent/never.log")), "");
    }

    #[test]
    fn test_read_log_tolerates_invalid_utf8() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("raw.log");
        std::fs::write(&path, [b'o', b'k', 0xff, b'\n']).unwrap();
        let contents = read_log(&path);
        assert!(contents.starts_with("ok"));
    }

    #[test]
    fn test_summary_serialization_skips_output() {
        let summary = EngagementSummary {
            target: "10.10.10.245".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            nmap_log: PathBuf::from("scans/nmap.attempt1.log"),
            open_ports: vec![21, 80],
            tools: vec![ToolRun {
                tool: "gobuster".to_string(),
                port: 80,
                success: true,
                log_path: PathBuf::from("scans/gobuster-80.attempt1.log"),
                output: "secret output stays in the log".to_string(),
            }],
            report: None,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"target\":\"10.10.10.245\""));
        assert!(json.contains("\"open_ports\":[21,80]"));
        assert!(json.contains("gobuster"));
        assert!(!json.contains("secret output"));
        assert!(json.contains("\"report\":null"));
    }

    #[test]
    fn test_write_summary_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let project = ProjectDir::new(tmp.path().join("acme"));
        project.init().unwrap();

        let summary = EngagementSummary {
            target: "10.10.10.245".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            nmap_log: project.scan_base("nmap"),
            open_ports: vec![],
            tools: vec![],
            report: None,
        };
        write_summary(&project, &summary).unwrap();

        let contents = std::fs::read_to_string(project.summary()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["target"], "10.10.10.245");
    }

    #[test]
    fn test_build_invocation_carries_watchdog_config() {
        let mut config = RedfoxConfig::default();
        config.watchdog.max_retries = 7;
        config.watchdog.backoff_base_secs = 11;
        config.watchdog.niceness = 3;

        let invocation = build_invocation(
            &config,
            vec!["nmap".to_string()],
            PathBuf::from("scans/nmap"),
            900,
            120,
        );
        assert_eq!(invocation.max_retries, 7);
        assert_eq!(invocation.backoff_base_secs, 11);
        assert_eq!(invocation.niceness, 3);
        assert_eq!(invocation.total_timeout_secs, 900);
        assert_eq!(invocation.idle_timeout_secs, 120);
    }
}
