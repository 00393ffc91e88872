use crate::config::{ContainerConfig, HydraConfig, WordlistConfig};
use crate::container::{ContainerCommand, ContainerError};

/// FTP credential brute-force.
///
/// Hydra's service syntax is `-s <port> <target> <service>`; the container
/// image's entrypoint is hydra, with the wordlist directory mounted at
/// `/wordlists` so the `-L`/`-P` paths resolve inside the container.
pub fn command(
    target: &str,
    port: u16,
    cfg: &HydraConfig,
    wordlists: &WordlistConfig,
    runtime: Option<&ContainerConfig>,
) -> Result<Vec<String>, ContainerError> {
    match runtime {
        Some(rt) => {
            let inner = vec![
                "-L".to_string(),
                format!("/wordlists/{}", wordlists.users),
                "-P".to_string(),
                format!("/wordlists/{}", wordlists.passwords),
                "-s".to_string(),
                port.to_string(),
                target.to_string(),
                "ftp".to_string(),
            ];
            ContainerCommand::new(&cfg.image)
                .cpus(rt.cpus)
                .memory(&rt.memory)
                .mount(&wordlists.dir, "/wordlists")
                .build(&inner)
        }
        None => Ok(vec![
            "hydra".to_string(),
            "-L".to_string(),
            wordlists.dir.join(&wordlists.users).display().to_string(),
            "-P".to_string(),
            wordlists.dir.join(&wordlists.passwords).display().to_string(),
            "-s".to_string(),
            port.to_string(),
            target.to_string(),
            "ftp".to_string(),
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
            21,
            &HydraConfig::default(),
            &WordlistConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(
            argv,
            vec![
                "hydra",
                "-L",
                "wordlists/users/names.txt",
                "-P",
                "wordlists/passwords/rockyou.txt",
                "-s",
                "21",
                "10.10.10.245",
                "ftp",
            ]
        );
    }

    #[test]
    fn test_container_command_rewrites_wordlist_paths() {
        let argv = command(
            "10.10.10.245",
            21,
            &HydraConfig::default(),
            &WordlistConfig::default(),
            Some(&ContainerConfig::default()),
        )
        .unwrap();
        assert_eq!(argv[0], "docker");
        assert!(argv.contains(&"/wordlists/users/names.txt".to_string()));
        assert!(argv.contains(&"/wordlists/passwords/rockyou.txt".to_string()));
        // service comes last, after the target
        assert_eq!(argv.last().unwrap(), "ftp");
        let target_index = argv.iter().position(|a| a == "10.10.10.245").unwrap();
        assert_eq!(argv[target_index - 2], "-s");
        assert_eq!(argv[target_index - 1], "21");
    }
}
