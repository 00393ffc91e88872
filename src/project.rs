use std::path::{Path, PathBuf};

/// Manages one engagement's directory layout.
///
/// All artifacts for a target live under a single project directory
/// (default `projects/<name>/`): supervised attempt logs under `scans/`,
/// the rendered HTML report, and the machine-readable summary.
#[derive(Debug, Clone)]
pub struct ProjectDir {
    root: PathBuf,
}

impl ProjectDir {
    /// Create a new ProjectDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root (e.g. `projects/acme/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding per-attempt scanner logs.
    pub fn scans_dir(&self) -> PathBuf {
        self.root.join("scans")
    }

    /// Base path handed to the supervisor for one tool; attempt logs land
    /// next to it as `scans/<tool>.attempt<N>.log`.
    pub fn scan_base(&self, tool: &str) -> PathBuf {
        self.scans_dir().join(tool)
    }

    /// Path to the rendered HTML report.
    pub fn report(&self) -> PathBuf {
        self.root.join("pentest_report.html")
    }

    /// Path to the JSON engagement summary.
    pub fn summary(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    /// Initialize the directory structure (root and `scans/`).
    /// Idempotent; returns Ok(true) if the root was created, Ok(false) if
    /// it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.scans_dir())?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_dir_paths() {
        let project = ProjectDir::new("projects/acme");
        assert_eq!(project.root(), Path::new("projects/acme"));
        assert_eq!(project.scans_dir(), PathBuf::from("projects/acme/scans"));
        assert_eq!(
            project.scan_base("nmap"),
            PathBuf::from("projects/acme/scans/nmap")
        );
        assert_eq!(
            project.report(),
            PathBuf::from("projects/acme/pentest_report.html")
        );
        assert_eq!(
            project.summary(),
            PathBuf::from("projects/acme/summary.json")
        );
    }

    #[test]
    fn test_init_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("acme");
        let project = ProjectDir::new(&root);

        assert!(!root.exists());
        let created = project.init().unwrap();
        assert!(created);
        assert!(root.exists());
        assert!(project.scans_dir().exists());
    }

    #[test]
    fn test_init_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("acme");
        let project = ProjectDir::new(&root);

        assert!(project.init().unwrap());
        assert!(!project.init().unwrap());
        assert!(project.scans_dir().exists());
    }

    #[test]
    fn test_init_preserves_existing_content() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("acme");
        let project = ProjectDir::new(&root);

        project.init().unwrap();
        let log = project.scan_base("nmap").with_extension("attempt1.log");
        std::fs::write(&log, "scan output").unwrap();

        project.init().unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "scan output");
    }
}
