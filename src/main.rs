mod advisor;
mod config;
mod container;
mod pentest;
mod project;
mod report;
mod retry;
mod tools;
mod watchdog;

use clap::Parser;
use config::RedfoxConfig;
use project::ProjectDir;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// A Rust CLI tool that drives security scanners under a resilient
/// watchdog: run nmap against a target, dispatch follow-up tools per open
/// port, capture every attempt to disk, and ask a local model to
/// synthesize the findings into an HTML report.
#[derive(Parser, Debug)]
#[command(name = "redfox", version, about)]
struct Cli {
    /// Target IP address or hostname
    #[arg(long)]
    ip: String,

    /// Project name; artifacts land in projects/<name>/
    #[arg(short, long, default_value = "engagement")]
    output: String,

    /// Config file path
    #[arg(short, long, default_value = "redfox.toml")]
    config: PathBuf,

    /// AI model for report synthesis (overrides config; unset skips the report)
    #[arg(short, long)]
    model: Option<String>,

    /// Run tools natively instead of inside containers
    #[arg(long)]
    no_container: bool,

    /// Override every tool's total timeout (seconds)
    #[arg(long)]
    timeout: Option<u64>,

    /// Override max retries per invocation
    #[arg(long)]
    retries: Option<u32>,

    /// Validate config and print resolved settings, don't scan
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (watchdog polls, retry decisions)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress per-tool banners, only warnings and the summary
    #[arg(short, long)]
    quiet: bool,
}

/// Fold CLI flags over the file-loaded configuration.
fn apply_overrides(config: &mut RedfoxConfig, cli: &Cli) {
    if cli.no_container {
        config.container.enabled = false;
    }
    if let Some(model) = &cli.model {
        config.ai.model = Some(model.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.nmap.total_timeout_secs = timeout;
        config.gobuster.total_timeout_secs = timeout;
        config.hydra.total_timeout_secs = timeout;
        config.nikto.total_timeout_secs = timeout;
        config.ai.total_timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.watchdog.max_retries = retries;
    }
}

fn print_resolved(config: &RedfoxConfig, project: &ProjectDir, cli: &Cli) {
    println!("redfox v{}", env!("CARGO_PKG_VERSION"));
    println!("Target:      {}", cli.ip);
    println!("Project:     {}", project.root().display());
    println!("Containers:  {}", config.container.enabled);
    println!(
        "Model:       {}",
        config.ai.model.as_deref().unwrap_or("(none, report skipped)")
    );
    println!(
        "Watchdog:    retries={} backoff_base={}s niceness={}",
        config.watchdog.max_retries, config.watchdog.backoff_base_secs, config.watchdog.niceness
    );
    println!(
        "Nmap:        image={} total={}s idle={}s",
        config.nmap.image, config.nmap.total_timeout_secs, config.nmap.idle_timeout_secs
    );
    println!(
        "Gobuster:    image={} total={}s idle={}s",
        config.gobuster.image, config.gobuster.total_timeout_secs, config.gobuster.idle_timeout_secs
    );
    println!(
        "Hydra:       image={} total={}s idle={}s",
        config.hydra.image, config.hydra.total_timeout_secs, config.hydra.idle_timeout_secs
    );
    println!(
        "Nikto:       image={} total={}s idle={}s",
        config.nikto.image, config.nikto.total_timeout_secs, config.nikto.idle_timeout_secs
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::info!("redfox starting");
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match RedfoxConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &cli);

    let project = ProjectDir::new(Path::new("projects").join(&cli.output));

    if cli.dry_run {
        print_resolved(&config, &project, &cli);
        println!("Dry run mode — config validated, not scanning.");
        return;
    }

    match pentest::run_pentest(&config, &project, &cli.ip).await {
        Ok(summary) => {
            println!("Engagement complete: {}", summary.target);
            println!("  open ports: {:?}", summary.open_ports);
            println!("  tools run:  {}", summary.tools.len());
            match &summary.report {
                Some(path) => println!("  report:     {}", path.display()),
                None => println!("  report:     (none)"),
            }
            println!("  summary:    {}", project.summary().display());
        }
        Err(e) => {
            tracing::error!(error = %e, "engagement failed");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_cli_minimal() {
        let cli = cli(&["redfox", "--ip", "10.10.10.245"]);
        assert_eq!(cli.ip, "10.10.10.245");
        assert_eq!(cli.output, "engagement");
        assert_eq!(cli.config, PathBuf::from("redfox.toml"));
        assert!(!cli.no_container);
        assert!(cli.model.is_none());
    }

    #[test]
    fn test_cli_requires_ip() {
        assert!(Cli::try_parse_from(["redfox"]).is_err());
    }

    #[test]
    fn test_overrides_disable_container_and_set_model() {
        let cli = cli(&["redfox", "--ip", "t", "--no-container", "-m", "gemma3"]);
        let mut config = RedfoxConfig::default();
        apply_overrides(&mut config, &cli);
        assert!(!config.container.enabled);
        assert_eq!(config.ai.model.as_deref(), Some("gemma3"));
    }

    #[test]
    fn test_overrides_timeout_applies_to_all_tools() {
        let cli = cli(&["redfox", "--ip", "t", "--timeout", "42"]);
        let mut config = RedfoxConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.nmap.total_timeout_secs, 42);
        assert_eq!(config.gobuster.total_timeout_secs, 42);
        assert_eq!(config.hydra.total_timeout_secs, 42);
        assert_eq!(config.nikto.total_timeout_secs, 42);
        assert_eq!(config.ai.total_timeout_secs, 42);
        // idle limits are untouched
        assert_eq!(config.nmap.idle_timeout_secs, 120);
    }

    #[test]
    fn test_overrides_retries() {
        let cli = cli(&["redfox", "--ip", "t", "--retries", "0"]);
        let mut config = RedfoxConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.watchdog.max_retries, 0);
    }

    #[test]
    fn test_overrides_noop_without_flags() {
        let cli = cli(&["redfox", "--ip", "t"]);
        let mut config = RedfoxConfig::default();
        apply_overrides(&mut config, &cli);
        assert!(config.container.enabled);
        assert_eq!(config.watchdog.max_retries, 2);
        assert!(config.ai.model.is_none());
    }
}
