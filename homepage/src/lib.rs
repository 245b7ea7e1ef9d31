pub mod handlers;
pub mod homepage;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, middleware::Logger, web};
use anyhow::{Context, Result};
use handlebars::Handlebars;
use log::info;
use walkdir::WalkDir;

use crate::handlers::SiteState;
use crate::homepage::config::package_dir;
use crate::homepage::{SiteConfig, SiteDescriptor};

pub async fn run() -> io::Result<()> {
    let config = SiteConfig::load();
    let server_cfg = config.server.clone();

    // An unusable descriptor must stop start-up before anything is served.
    let site = SiteDescriptor::from_config(&config.site).map_err(io::Error::other)?;
    info!(
        "Serving {} from {} for hosts: {}",
        config.site.title,
        site.root().display(),
        site.host_names().collect::<Vec<_>>().join(", ")
    );

    let handlebars = build_handlebars(&templates_dir()).map_err(io::Error::other)?;
    let handlebars = web::Data::new(handlebars);
    let state = web::Data::new(SiteState::new(site, config));
    let cors_origins = server_cfg.cors_origins.clone();

    info!(
        "Listening on: http://{}:{}",
        server_cfg.host, server_cfg.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(handlebars.clone())
            .wrap(build_cors(&cors_origins))
            .configure(|conf| handlers::config(conf, &state))
    })
    .bind((server_cfg.host.as_str(), server_cfg.port))?
    .run()
    .await
}

fn build_cors(origins: &[String]) -> Cors {
    let base = Cors::default()
        .allowed_methods(vec!["GET"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_any_origin();
    }

    origins
        .iter()
        .fold(base, |c, origin| c.allowed_origin(origin))
}

pub fn templates_dir() -> PathBuf {
    package_dir().join("templates")
}

/// Register every `.hbs` file under `templates_dir`: top-level files become
/// templates named by stem, nested files become partials named by relative path.
pub fn build_handlebars(templates_dir: &Path) -> Result<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();

    for entry in WalkDir::new(templates_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && e.path().extension() == Some(OsStr::new("hbs")))
    {
        let path = entry.path();
        let rel = path
            .strip_prefix(templates_dir)
            .context("template path outside the templates directory")?;
        let rel_no_ext = rel.with_extension("");
        let name = rel_no_ext.to_string_lossy().replace('\\', "/");

        if rel.parent().map(|p| p == Path::new("")).unwrap_or(true) {
            // top-level templates (index, page, projects)
            handlebars
                .register_template_file(&name, path)
                .with_context(|| format!("failed to register template {name}"))?;
        } else {
            // nested templates are partials (components/...)
            let partial_src = fs::read_to_string(path)
                .with_context(|| format!("failed to read partial {name}"))?;
            handlebars
                .register_partial(&name, partial_src)
                .with_context(|| format!("failed to register partial {name}"))?;
        }
    }

    Ok(handlebars)
}
