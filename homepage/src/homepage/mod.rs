pub mod config;
pub mod error;
pub mod pages;
pub mod projects;
pub mod site;

pub use config::SiteConfig;
pub use error::SiteError;
pub use projects::{ProjectCollection, ProjectOrder, ProjectRecord, load_projects, load_projects_with};
pub use site::SiteDescriptor;
