use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Page {
    pub slug: String,
    pub title: String,
    pub meta: PageMetadata,
    pub html: String,
}

impl Page {
    pub fn is_draft(&self) -> bool {
        self.meta.draft
    }
}

/// Read and render the Markdown page at `path`.
pub fn render_page(slug: &str, path: &Path) -> Result<Page> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading markdown at {}", path.display()))?;
    render_source(slug, &content)
        .with_context(|| format!("rendering markdown at {}", path.display()))
}

pub fn render_source(slug: &str, content: &str) -> Result<Page> {
    let (frontmatter, body) = split_frontmatter(content);

    let meta = match frontmatter {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str::<PageMetadata>(&yaml).context("parsing frontmatter")?
        }
        _ => PageMetadata::default(),
    };

    let html = markdown::to_html_with_options(
        &body,
        &markdown::Options {
            parse: markdown::ParseOptions::gfm(),
            compile: markdown::CompileOptions {
                allow_dangerous_html: true,
                ..markdown::CompileOptions::gfm()
            },
        },
    )
    .map_err(|e| anyhow!(e.to_string()))?;

    let title = meta
        .title
        .clone()
        .unwrap_or_else(|| humanize_segment(slug.rsplit('/').next().unwrap_or(slug)));

    Ok(Page {
        slug: slug.to_string(),
        title,
        meta,
        html,
    })
}

/// Split a leading `---` delimited YAML block off the document.
fn split_frontmatter(content: &str) -> (Option<String>, String) {
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return (None, content.to_string());
    }

    let mut fm_lines = vec![];
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim() == "---" {
            closed = true;
            break;
        }
        fm_lines.push(line);
    }

    if !closed {
        return (None, content.to_string());
    }

    let remainder = lines.collect::<Vec<&str>>().join("\n");
    (Some(fm_lines.join("\n")), remainder)
}

pub fn humanize_segment(segment: &str) -> String {
    segment.replace(['-', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_frontmatter_and_body() {
        let src = "---\ntitle: Nix flakes, slowly\ndate: 2024-03-01\ntags: [nix, builds]\n---\n# Hello\n\nSome *prose*.";

        let page = render_source("posts/nix-flakes", src).unwrap();

        assert_eq!(page.title, "Nix flakes, slowly");
        assert_eq!(page.meta.date.as_deref(), Some("2024-03-01"));
        assert_eq!(page.meta.tags, vec!["nix", "builds"]);
        assert!(!page.is_draft());
        assert!(page.html.contains("<h1>Hello</h1>"));
        assert!(page.html.contains("<em>prose</em>"));
        assert!(!page.html.contains("title:"));
    }

    #[test]
    fn title_falls_back_to_slug() {
        let page = render_source("posts/hello-world", "just text").unwrap();
        assert_eq!(page.title, "hello world");
        assert_eq!(page.meta, PageMetadata::default());
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let page = render_source("index", "---\nnot closed").unwrap();
        assert!(page.meta.title.is_none());
        assert!(page.html.contains("not closed"));
    }

    #[test]
    fn draft_flag_is_read() {
        let page = render_source("wip", "---\ndraft: true\n---\nsoon").unwrap();
        assert!(page.is_draft());
    }

    #[test]
    fn malformed_frontmatter_is_an_error() {
        assert!(render_source("bad", "---\ntags: [unclosed\n---\nbody").is_err());
    }
}
