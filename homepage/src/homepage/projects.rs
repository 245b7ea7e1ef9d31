use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use confik::Configuration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::homepage::error::{Result, SiteError};

/// One decoded project file. Keys are kept exactly as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProjectRecord {
    #[serde(skip)]
    source: PathBuf,
    data: Value,
}

pub type ProjectCollection = Vec<ProjectRecord>;

/// How records are ordered in a [`ProjectCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Configuration)]
#[serde(rename_all = "kebab-case")]
#[confik(forward(serde(rename_all = "kebab-case")))]
pub enum ProjectOrder {
    /// Sorted by source file name.
    #[default]
    FileName,
    /// Whatever order the platform lists the directory in.
    Enumeration,
}

impl ProjectRecord {
    fn read(path: PathBuf) -> Result<Self> {
        // The handle is closed before decoding starts.
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) => return Err(SiteError::Read { path, source }),
        };

        match serde_json::from_slice(&bytes) {
            Ok(data) => Ok(Self { source: path, data }),
            Err(source) => Err(SiteError::Decode { path, source }),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn into_value(self) -> Value {
        self.data
    }
}

/// Decode every regular file directly inside `directory`, sorted by file name.
pub fn load_projects(directory: &Path) -> Result<ProjectCollection> {
    load_projects_with(directory, ProjectOrder::FileName)
}

/// Decode every regular file directly inside `directory`.
///
/// Subdirectories are not entered. Symlinks are followed; dangling links are
/// skipped along with sockets, fifos and other non-regular entries. The first
/// file that cannot be read or decoded aborts the whole load.
pub fn load_projects_with(directory: &Path, order: ProjectOrder) -> Result<ProjectCollection> {
    let not_found = |source: io::Error| SiteError::DirectoryNotFound {
        path: directory.to_path_buf(),
        source,
    };

    let meta = fs::metadata(directory).map_err(not_found)?;
    if !meta.is_dir() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }

    let mut walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    if order == ProjectOrder::FileName {
        walker = walker.sort_by_file_name();
    }

    let mut projects = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(not_found(err.into())),
            Err(err) if is_dangling_or_loop(&err) => continue,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| directory.to_path_buf());
                return Err(SiteError::Read {
                    path,
                    source: err.into(),
                });
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        projects.push(ProjectRecord::read(entry.into_path())?);
    }

    Ok(projects)
}

/// A link whose target is gone, or one that points back at an ancestor.
/// Any other failure to stat an entry must not hide the file.
fn is_dangling_or_loop(err: &walkdir::Error) -> bool {
    err.loop_ancestor().is_some()
        || err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound)
}
