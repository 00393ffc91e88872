use crate::config::{ContainerConfig, NmapConfig};
use crate::container::{ContainerCommand, ContainerError};
use regex::Regex;
use std::sync::LazyLock;

/// `<port>/tcp open` lines in nmap's normal output.
static OPEN_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d{1,5})/tcp\s+open\b").unwrap());

/// Service-and-version scan of the whole target.
pub fn command(
    target: &str,
    cfg: &NmapConfig,
    runtime: Option<&ContainerConfig>,
) -> Result<Vec<String>, ContainerError> {
    let inner: Vec<String> = ["nmap", "-sV", "-Pn", "-A", target]
        .iter()
        .map(|s| s.to_string())
        .collect();
    match runtime {
        Some(rt) => ContainerCommand::new(&cfg.image)
            .cpus(rt.cpus)
            .memory(&rt.memory)
            .build(&inner),
        None => Ok(inner),
    }
}

/// Extract the open TCP ports from a captured nmap log, in report order.
///
/// Matches whole `<port>/tcp open` lines only, so a port number quoted in
/// a service banner never triggers a dispatch.
pub fn parse_open_ports(output: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for captures in OPEN_PORT.captures_iter(output) {
        if let Ok(port) = captures[1].parse::<u16>() {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_command() {
        let cfg = NmapConfig::default();
        let argv = command("10.10.10.245", &cfg, None).unwrap();
        assert_eq!(argv, vec!["nmap", "-sV", "-Pn", "-A", "10.10.10.245"]);
    }

    #[test]
    fn test_container_command_wraps_native() {
        let cfg = NmapConfig::default();
        let rt = ContainerConfig::default();
        let argv = command("10.10.10.245", &cfg, Some(&rt)).unwrap();
        assert_eq!(argv[0], "docker");
        assert!(argv.contains(&"instrumentisto/nmap".to_string()));
        assert_eq!(argv.last().unwrap(), "10.10.10.245");
        let image_index = argv.iter().position(|a| a == "instrumentisto/nmap").unwrap();
        assert_eq!(argv[image_index + 1], "nmap");
    }

    #[test]
    fn test_parse_open_ports() {
        let output = "\
Starting Nmap 7.94 ( https://nmap.org )
Nmap scan report for 10.10.10.245
PORT     STATE    SERVICE  VERSION
21/tcp   open     ftp      vsftpd 3.0.3
22/tcp   filtered ssh
80/tcp   open     http     Apache httpd 2.4.41
8080/tcp closed   http-proxy
";
        assert_eq!(parse_open_ports(output), vec![21, 80]);
    }

    #[test]
    fn test_parse_ignores_banner_mentions() {
        // "80/tcp open" inside a banner line must not count: it is not at
        // line start
        let output = "21/tcp open ftp\n|  banner: see 80/tcp open elsewhere\n";
        assert_eq!(parse_open_ports(output), vec![21]);
    }

    #[test]
    fn test_parse_deduplicates_and_keeps_order() {
        let output = "80/tcp open http\n21/tcp open ftp\n80/tcp open http\n";
        assert_eq!(parse_open_ports(output), vec![80, 21]);
    }

    #[test]
    fn test_parse_no_open_ports() {
        assert!(parse_open_ports("All 1000 scanned ports are closed").is_empty());
        assert!(parse_open_ports("").is_empty());
    }

    #[test]
    fn test_parse_skips_out_of_range_port() {
        let output = "999999/tcp open weird\n80/tcp open http\n";
        assert_eq!(parse_open_ports(output), vec![80]);
    }
}
