use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use actix_files::NamedFile;
use actix_web::dev::RequestHead;
use actix_web::guard::{Guard, GuardContext};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, Responder, get, web};
use anyhow::anyhow;
use chrono::{Datelike, Utc};
use handlebars::Handlebars;
use log::error;
use serde::Serialize;
use serde_json::json;

use crate::homepage::pages::{Page, render_page};
use crate::homepage::{ProjectCollection, SiteConfig, SiteDescriptor, load_projects_with};

/// Everything the request handlers share: the site descriptor and the
/// configuration it was built from.
pub struct SiteState {
    pub site: SiteDescriptor,
    pub config: SiteConfig,
}

impl SiteState {
    pub fn new(site: SiteDescriptor, config: SiteConfig) -> Self {
        Self { site, config }
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.site.resolve(&self.config.site.projects_dir)
    }
}

pub fn config(conf: &mut web::ServiceConfig, state: &web::Data<SiteState>) {
    let api_scope = web::scope("/api")
        .service(healthcheck_handler)
        .service(projects_api_handler);

    let site_scope = web::scope("")
        .service(api_scope)
        .service(projects_page_handler)
        .route("/{path:.*}", web::get().to(content_handler));

    if state.config.server.enforce_host {
        conf.service(site_scope.guard(SiteHost(state.clone())));
    } else {
        conf.service(site_scope);
    }
}

/// Admits requests whose host (port removed) is one of the site's host names.
struct SiteHost(web::Data<SiteState>);

impl Guard for SiteHost {
    fn check(&self, ctx: &GuardContext<'_>) -> bool {
        request_host(ctx.head()).is_some_and(|host| self.0.site.matches(host))
    }
}

fn request_host(head: &RequestHead) -> Option<&str> {
    head.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| head.uri.host())
        .map(strip_port)
}

/// `alyxia.dev:8080` -> `alyxia.dev`, `[::1]:8080` -> `[::1]`.
pub fn strip_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &authority[..end + 2],
            None => authority,
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

#[get("/health")]
pub async fn healthcheck_handler() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "pong" }))
}

#[get("/projects")]
pub async fn projects_api_handler(state: web::Data<SiteState>) -> impl Responder {
    match load_site_projects(&state).await {
        Ok(projects) => HttpResponse::Ok().json(projects),
        Err(err) => {
            error!("failed to load projects: {err}");
            HttpResponse::InternalServerError().json(json!({ "error": err.to_string() }))
        }
    }
}

#[get("/projects")]
pub async fn projects_page_handler(
    state: web::Data<SiteState>,
    hb: web::Data<Handlebars<'static>>,
) -> impl Responder {
    let projects = match load_site_projects(&state).await {
        Ok(projects) => projects,
        Err(err) => {
            error!("failed to load projects: {err}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let ctx = json!({
        "site": site_context(&state.config),
        "footer": footer_context(&state.config),
        "title": "Projects",
        "projects": projects,
    });
    render(hb, "projects", ctx, HttpResponse::Ok())
}

async fn load_site_projects(state: &web::Data<SiteState>) -> anyhow::Result<ProjectCollection> {
    let dir = state.projects_dir();
    let order = state.config.site.project_order;

    let projects = web::block(move || load_projects_with(&dir, order))
        .await
        .map_err(|err| anyhow!("project loader did not finish: {err}"))??;
    Ok(projects)
}

async fn content_handler(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<SiteState>,
    hb: web::Data<Handlebars<'static>>,
) -> HttpResponse {
    let Some(relative) = sanitize_relative(&path) else {
        return HttpResponse::NotFound().finish();
    };

    match locate_content(&state.site, &relative) {
        Some(Content::Page { slug, source }) => {
            render_markdown(slug, source, &state.config, hb).await
        }
        Some(Content::File(file)) => match NamedFile::open_async(&file).await {
            Ok(named) => named.into_response(&req),
            Err(err) => {
                error!("failed to open {}: {}", file.display(), err);
                HttpResponse::NotFound().finish()
            }
        },
        None => HttpResponse::NotFound().finish(),
    }
}

async fn render_markdown(
    slug: String,
    source: PathBuf,
    config: &SiteConfig,
    hb: web::Data<Handlebars<'static>>,
) -> HttpResponse {
    let page_slug = slug.clone();
    let page = match web::block(move || render_page(&page_slug, &source)).await {
        Ok(Ok(page)) => page,
        Ok(Err(err)) => {
            error!("failed to render page {}: {:#}", slug, err);
            return HttpResponse::InternalServerError().finish();
        }
        Err(err) => {
            error!("failed to render page {}: {}", slug, err);
            return HttpResponse::InternalServerError().finish();
        }
    };

    if page.is_draft() {
        return HttpResponse::NotFound().finish();
    }

    let template = if slug == "index" { "index" } else { "page" };
    let ctx = PageContext {
        site: site_context(config),
        footer: footer_context(config),
        title: page.title.clone(),
        page: &page,
    };
    render(hb, template, json!(ctx), HttpResponse::Ok())
}

fn render(
    hb: web::Data<Handlebars<'static>>,
    template: &str,
    data: serde_json::Value,
    mut builder: HttpResponseBuilder,
) -> HttpResponse {
    match hb.render(template, &data) {
        Ok(body) => builder.content_type("text/html; charset=utf-8").body(body),
        Err(err) => {
            error!("failed to render template {template}: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, PartialEq)]
enum Content {
    Page { slug: String, source: PathBuf },
    File(PathBuf),
}

/// Map a sanitized request path onto the content root.
///
/// `posts/nix` renders `posts/nix.md` or `posts/nix/index.md`; anything else
/// that is a regular file is served as is.
fn locate_content(site: &SiteDescriptor, relative: &Path) -> Option<Content> {
    let slug = relative.to_string_lossy().replace('\\', "/");

    if slug.is_empty() {
        let index = site.resolve("index.md");
        return index.is_file().then(|| Content::Page {
            slug: "index".into(),
            source: index,
        });
    }

    let resolved = site.resolve(relative);

    let markdown = with_md_suffix(&resolved);
    if markdown.is_file() {
        return Some(Content::Page {
            slug,
            source: markdown,
        });
    }

    let folder_index = resolved.join("index.md");
    if folder_index.is_file() {
        return Some(Content::Page {
            slug: format!("{slug}/index"),
            source: folder_index,
        });
    }

    resolved.is_file().then_some(Content::File(resolved))
}

fn with_md_suffix(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".md");
    PathBuf::from(raw)
}

/// Turn an untrusted URL path into a path that stays under the content root.
/// Returns `None` for anything that tries to climb out of it.
pub fn sanitize_relative(raw: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();

    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => {
                if !Path::new(s)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
                {
                    return None;
                }
                clean.push(s);
            }
        }
    }

    Some(clean)
}

#[derive(Serialize)]
struct PageContext<'a> {
    site: SiteContext,
    footer: FooterContext,
    title: String,
    page: &'a Page,
}

#[derive(Serialize)]
struct SiteContext {
    name: String,
    tagline: Option<String>,
}

#[derive(Serialize)]
struct FooterContext {
    year: i32,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<Vec<FooterLink>>,
}

#[derive(Serialize)]
struct FooterLink {
    text: String,
    href: String,
}

fn site_context(config: &SiteConfig) -> SiteContext {
    SiteContext {
        name: config.site.title.clone(),
        tagline: config.site.tagline.clone(),
    }
}

fn footer_context(config: &SiteConfig) -> FooterContext {
    FooterContext {
        year: Utc::now().year(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        links: links_from_config(&config.site.footer_links),
    }
}

fn links_from_config(links: &BTreeMap<String, String>) -> Option<Vec<FooterLink>> {
    if links.is_empty() {
        return None;
    }

    Some(
        links
            .iter()
            .map(|(text, href)| FooterLink {
                text: text.to_string(),
                href: href.to_string(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[actix_web::test]
    async fn template_failure_does_not_leak_the_error() {
        let hb = web::Data::new(Handlebars::new());

        let resp = render(hb, "missing", json!({}), HttpResponse::Ok());

        assert_eq!(resp.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn strip_port_handles_names_and_ipv6() {
        assert_eq!(strip_port("alyxia.dev"), "alyxia.dev");
        assert_eq!(strip_port("alyxia.dev:8080"), "alyxia.dev");
        assert_eq!(strip_port("localhost:"), "localhost");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
        assert_eq!(strip_port("odd:name"), "odd:name");
    }

    #[test]
    fn sanitize_drops_empty_and_dot_segments() {
        assert_eq!(
            sanitize_relative("posts//./nix-flakes/"),
            Some(PathBuf::from("posts/nix-flakes"))
        );
        assert_eq!(sanitize_relative(""), Some(PathBuf::new()));
        assert_eq!(sanitize_relative("/"), Some(PathBuf::new()));
    }

    #[test]
    fn sanitize_rejects_escapes() {
        for raw in ["..", "posts/../../etc/passwd", "a/..", "a\\..\\b", "nul\0byte"] {
            assert_eq!(sanitize_relative(raw), None, "{raw:?} should be rejected");
        }
    }

    fn site_with(files: &[(&str, &str)]) -> (TempDir, SiteDescriptor) {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        let site = SiteDescriptor::new(["localhost"], dir.path()).unwrap();
        (dir, site)
    }

    #[test]
    fn locate_prefers_markdown_then_folder_index_then_file() {
        let (_dir, site) = site_with(&[
            ("index.md", "home"),
            ("posts/nix.md", "post"),
            ("notes/index.md", "notes"),
            ("static/site.css", "body {}"),
        ]);

        assert_eq!(
            locate_content(&site, Path::new("")),
            Some(Content::Page {
                slug: "index".into(),
                source: site.resolve("index.md"),
            })
        );
        assert_eq!(
            locate_content(&site, Path::new("posts/nix")),
            Some(Content::Page {
                slug: "posts/nix".into(),
                source: site.resolve("posts/nix.md"),
            })
        );
        assert_eq!(
            locate_content(&site, Path::new("notes")),
            Some(Content::Page {
                slug: "notes/index".into(),
                source: site.resolve("notes/index.md"),
            })
        );
        assert_eq!(
            locate_content(&site, Path::new("static/site.css")),
            Some(Content::File(site.resolve("static/site.css")))
        );
        assert_eq!(locate_content(&site, Path::new("static")), None);
        assert_eq!(locate_content(&site, Path::new("missing")), None);
    }

    #[test]
    fn dotted_slugs_keep_their_name() {
        let (_dir, site) = site_with(&[("posts/v1.2.md", "release")]);
        assert_eq!(
            locate_content(&site, Path::new("posts/v1.2")),
            Some(Content::Page {
                slug: "posts/v1.2".into(),
                source: site.resolve("posts/v1.2.md"),
            })
        );
    }
}
