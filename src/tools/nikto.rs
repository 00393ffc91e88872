use crate::config::{ContainerConfig, NiktoConfig};
use crate::container::{ContainerCommand, ContainerError};

/// Web server vulnerability scan.
pub fn command(
    target: &str,
    port: u16,
    use_ssl: bool,
    cfg: &NiktoConfig,
    runtime: Option<&ContainerConfig>,
) -> Result<Vec<String>, ContainerError> {
    let scheme = if use_ssl { "https" } else { "http" };
    let inner = vec![
        "nikto".to_string(),
        "-h".to_string(),
        format!("{scheme}://{target}:{port}"),
        "-nointeractive".to_string(),
    ];
    match runtime {
        Some(rt) => ContainerCommand::new(&cfg.image)
            .cpus(rt.cpus)
            .memory(&rt.memory)
            .build(&inner),
        None => Ok(inner),
    }
}

/// Pull the findings out of a captured nikto log.
///
/// Nikto prefixes findings with `+`; reference lines (OSVDB/CVE) and the
/// server banner are kept too. Deduplicated, original order.
pub fn parse_findings(output: &str) -> Vec<String> {
    let mut findings: Vec<String> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let finding = if let Some(rest) = line.strip_prefix('+') {
            rest.trim().to_string()
        } else if line.contains("OSVDB-")
            || line.contains("CVE-")
            || line.to_lowercase().starts_with("server:")
        {
            line.to_string()
        } else {
            continue;
        };
        if !finding.is_empty() && !findings.contains(&finding) {
            findings.push(finding);
        }
    }
    findings
}
