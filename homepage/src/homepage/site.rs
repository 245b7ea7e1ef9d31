use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::homepage::config::{SiteSettings, package_dir, resolve_path};
use crate::homepage::error::{Result, SiteError};

/// One logical site: the host names it answers to and the directory its
/// content is served from.
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDescriptor {
    host_names: BTreeSet<String>,
    root: PathBuf,
}

impl SiteDescriptor {
    /// Fails when `host_names` is empty or `root` is not a readable directory.
    /// The root is canonicalized here and never re-resolved.
    pub fn new<I, S>(host_names: I, root: impl AsRef<Path>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host_names: BTreeSet<String> = host_names.into_iter().map(Into::into).collect();
        if host_names.is_empty() {
            return Err(SiteError::Configuration(
                "a site needs at least one host name".into(),
            ));
        }

        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|err| {
            SiteError::Configuration(format!(
                "content root {} does not exist: {err}",
                root.display()
            ))
        })?;

        if !root.is_dir() {
            return Err(SiteError::Configuration(format!(
                "content root {} is not a directory",
                root.display()
            )));
        }

        fs::read_dir(&root).map_err(|err| {
            SiteError::Configuration(format!(
                "content root {} is not readable: {err}",
                root.display()
            ))
        })?;

        Ok(Self { host_names, root })
    }

    /// Build the descriptor from the `site` configuration section. A relative
    /// `content_root` is taken from the package directory.
    pub fn from_config(settings: &SiteSettings) -> Result<Self> {
        let root = resolve_path(&package_dir(), &settings.content_root);
        Self::new(settings.host_names.iter().cloned(), root)
    }

    /// Exact, case-sensitive membership test.
    pub fn matches(&self, host: &str) -> bool {
        self.host_names.contains(host)
    }

    /// Join `relative` onto the content root. No existence check and no
    /// traversal sanitization happen here.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.host_names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const HOSTS: [&str; 3] = ["alyxia.dev", "lisp.alyxia.dev", "localhost"];

    #[test]
    fn matches_only_members() {
        let dir = TempDir::new().unwrap();
        let site = SiteDescriptor::new(HOSTS, dir.path()).unwrap();

        for host in HOSTS {
            assert!(site.matches(host), "{host} should match");
        }
        for host in [
            "ALYXIA.DEV",
            "www.alyxia.dev",
            "alyxia.dev.",
            "dev",
            "",
            "localhost:8080",
        ] {
            assert!(!site.matches(host), "{host} should not match");
        }
    }

    #[test]
    fn empty_host_set_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = SiteDescriptor::new(Vec::<String>::new(), dir.path()).unwrap_err();
        assert!(matches!(err, SiteError::Configuration(_)));
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = SiteDescriptor::new(HOSTS, dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, SiteError::Configuration(_)));
    }

    #[test]
    fn file_root_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.md");
        fs::write(&file, "# hi").unwrap();

        let err = SiteDescriptor::new(HOSTS, &file).unwrap_err();
        assert!(matches!(err, SiteError::Configuration(_)));
    }

    #[test]
    fn root_is_canonical_and_resolve_joins() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("posts")).unwrap();

        let site = SiteDescriptor::new(HOSTS, dir.path().join("posts/..")).unwrap();

        let canonical = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(site.root(), canonical.as_path());
        assert_eq!(
            site.resolve("projects/a.json"),
            canonical.join("projects/a.json")
        );
    }

    #[test]
    fn duplicate_host_names_collapse() {
        let dir = TempDir::new().unwrap();
        let site =
            SiteDescriptor::new(["localhost", "localhost", "alyxia.dev"], dir.path()).unwrap();
        assert_eq!(
            site.host_names().collect::<Vec<_>>(),
            vec!["alyxia.dev", "localhost"]
        );
    }
}
