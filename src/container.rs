use std::path::{Path, PathBuf};

/// Builds a `docker run` argv wrapping an inner command with resource
/// limits and bind mounts. Pure string assembly; nothing is executed here.
#[derive(Debug, Clone)]
pub struct ContainerCommand {
    image: String,
    cpus: f64,
    memory: String,
    mounts: Vec<(PathBuf, String)>,
}

/// Errors produced while assembling a container argv.
#[derive(Debug)]
pub enum ContainerError {
    /// The image name was empty or whitespace.
    EmptyImage,
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::EmptyImage => write!(f, "container image name is empty"),
        }
    }
}

impl std::error::Error for ContainerError {}

impl ContainerCommand {
    /// Start building an invocation of `image` with default limits
    /// (1 CPU, 1g memory, no mounts).
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cpus: 1.0,
            memory: "1g".to_string(),
            mounts: Vec::new(),
        }
    }

    /// CPU limit passed as `--cpus=<n>`.
    pub fn cpus(mut self, cpus: f64) -> Self {
        self.cpus = cpus;
        self
    }

    /// Memory limit passed as `--memory=<size>` (e.g. "1g", "512m").
    pub fn memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// Bind-mount `host_path` at `container_path`. The host path is
    /// resolved to an absolute path at build time.
    pub fn mount(mut self, host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        self.mounts.push((host_path.into(), container_path.into()));
        self
    }

    /// Produce the final argv: runtime invocation, auto-remove, host
    /// networking, resource limits, one `-v` pair per mount, the image,
    /// then `inner` verbatim.
    pub fn build(&self, inner: &[String]) -> Result<Vec<String>, ContainerError> {
        if self.image.trim().is_empty() {
            return Err(ContainerError::EmptyImage);
        }

        let mut argv = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "--network=host".to_string(),
            format!("--cpus={}", self.cpus),
            format!("--memory={}", self.memory),
        ];
        for (host, container) in &self.mounts {
            let host = std::path::absolute(host).unwrap_or_else(|_| host.clone());
            argv.push("-v".to_string());
            argv.push(format!("{}:{}", host.display(), container));
        }
        argv.push(self.image.clone());
        argv.extend(inner.iter().cloned());
        Ok(argv)
    }
}

/// Whether `program` is a container runtime binary.
///
/// Niceness is only applied to commands that run directly on the host; a
/// runtime invocation just talks to a daemon, so renicing it is pointless.
pub fn is_container_runtime(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .map(|name| name == "docker" || name == "podman")
        .unwrap_or(false)
}
