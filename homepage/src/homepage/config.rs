use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use confik::{Configuration, EnvSource};
use serde::{Deserialize, Serialize};

use self::yaml::YamlFileSource;
use crate::homepage::projects::ProjectOrder;

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct SiteSettings {
    #[confik(default = default_title())]
    pub title: String,
    #[confik(default)]
    pub tagline: Option<String>,
    /// Every host name this site answers to, e.g. `alyxia.dev`.
    #[confik(default = default_host_names())]
    pub host_names: Vec<String>,
    /// Content directory; relative paths are taken from the package directory.
    #[confik(default = default_content_root())]
    pub content_root: String,
    /// Directory of project JSON files, relative to `content_root`.
    #[confik(default = default_projects_dir())]
    pub projects_dir: String,
    #[confik(default)]
    pub project_order: ProjectOrder,
    #[confik(default = default_footer_links())]
    pub footer_links: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct ServerConfig {
    #[confik(default = default_listen_host())]
    pub host: String,
    #[confik(default = default_port())]
    pub port: u16,
    /// Reject requests whose `Host` is not one of the site's host names.
    #[confik(default = true)]
    pub enforce_host: bool,
    #[confik(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Configuration)]
pub struct SiteConfig {
    pub site: SiteSettings,
    pub server: ServerConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: SiteSettings {
                title: default_title(),
                tagline: None,
                host_names: default_host_names(),
                content_root: default_content_root(),
                projects_dir: default_projects_dir(),
                project_order: ProjectOrder::default(),
                footer_links: default_footer_links(),
            },
            server: ServerConfig {
                host: default_listen_host(),
                port: default_port(),
                enforce_host: true,
                cors_origins: Vec::new(),
            },
        }
    }
}

fn default_title() -> String {
    "alyxia.dev".into()
}

fn default_host_names() -> Vec<String> {
    vec![
        "alyxia.dev".into(),
        "lisp.alyxia.dev".into(),
        "localhost".into(),
    ]
}

fn default_content_root() -> String {
    "../content".into()
}

fn default_projects_dir() -> String {
    "projects".into()
}

fn default_listen_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

pub fn default_footer_links() -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    links.insert("GitHub".into(), "https://github.com/alyxia".into());
    links
}

impl SiteConfig {
    /// Load configuration from `config.yml` (if present) and environment variables.
    /// Falls back to the compiled-in defaults when parsing fails.
    pub fn load() -> Self {
        Self::load_from(&package_dir().join("config.yml"))
    }

    pub fn load_from(config_path: &Path) -> Self {
        let mut builder = SiteConfig::builder();

        if config_path.exists() {
            builder.override_with(YamlFileSource::new(config_path));
        }

        builder.override_with(EnvSource::new());

        match builder.try_build() {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!(
                    "Failed to load {} or env overrides: {err}. Using defaults.",
                    config_path.display()
                );
                SiteConfig::default()
            }
        }
    }
}

/// Directory the package was built from; relative configured paths hang off it.
pub fn package_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(path)
    }
}

mod yaml {
    use std::error::Error;
    use std::path::PathBuf;

    use confik::Source;
    use serde::de::DeserializeOwned;
    use serde_yaml;

    #[derive(Debug)]
    pub struct YamlFileSource {
        path: PathBuf,
    }

    impl YamlFileSource {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl<T> Source<T> for YamlFileSource
    where
        T: DeserializeOwned + confik::ConfigurationBuilder,
    {
        fn allows_secrets(&self) -> bool {
            false
        }

        fn provide(&self) -> Result<T, Box<dyn Error + Sync + Send>> {
            let contents = std::fs::read_to_string(&self.path)?;
            let parsed = serde_yaml::from_str(&contents)?;
            Ok(parsed)
        }
    }
}
