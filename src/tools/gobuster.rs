use crate::config::{ContainerConfig, GobusterConfig, WordlistConfig};
use crate::container::{ContainerCommand, ContainerError};

/// Directory brute-force against the target's web server.
///
/// The container image's entrypoint is the gobuster binary, so the inner
/// argv starts at the subcommand; the host wordlist directory is mounted
/// at `/wordlists`.
pub fn command(
    target: &str,
    port: u16,
    cfg: &GobusterConfig,
    wordlists: &WordlistConfig,
    runtime: Option<&ContainerConfig>,
) -> Result<Vec<String>, ContainerError> {
    let url = format!("http://{target}:{port}");
    match runtime {
        Some(rt) => {
            let inner = vec![
                "dir".to_string(),
                "-u".to_string(),
                url,
                "-w".to_string(),
                format!("/wordlists/{}", wordlists.web_common),
            ];
            ContainerCommand::new(&cfg.image)
                .cpus(rt.cpus)
                .memory(&rt.memory)
                .mount(&wordlists.dir, "/wordlists")
                .build(&inner)
        }
        None => Ok(vec![
            "gobuster".to_string(),
            "dir".to_string(),
            "-u".to_string(),
            url,
            "-w".to_string(),
            wordlists.dir.join(&wordlists.web_common).display().to_string(),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_command() {
        let argv = command(
            "10.10.10.245",
            80,
            &GobusterConfig::default(),
            &WordlistConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(
            argv,
            vec![
                "gobuster",
                "dir",
                "-u",
                "http://10.10.10.245:80",
                "-w",
                "wordlists/common.txt",
            ]
        );
    }

    #[test]
    fn test_container_command_mounts_wordlists() {
        let argv = command(
            "10.10.10.245",
            8080,
            &GobusterConfig::default(),
            &WordlistConfig::default(),
            Some(&ContainerConfig::default()),
        )
        .unwrap();
        assert_eq!(argv[0], "docker");
        let v_index = argv.iter().position(|a| a == "-v").unwrap();
        assert!(argv[v_index + 1].ends_with(":/wordlists"));
        // entrypoint is gobuster itself: subcommand comes right after the image
        let image_index = argv
            .iter()
            .position(|a| a == "aoighost/gobuster:latest")
            .unwrap();
        assert_eq!(argv[image_index + 1], "dir");
        assert!(argv.contains(&"http://10.10.10.245:8080".to_string()));
        assert!(argv.contains(&"/wordlists/common.txt".to_string()));
    }
}
