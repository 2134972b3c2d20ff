//! Static HTML preview of a laid-out feed.
//!
//! One flex column per layout column, each tile sized by its aspect ratio so
//! the page has its final shape before any media arrives. Sources go through
//! the signed-URL cache first; a source that could not be resolved renders as
//! a placeholder panel rather than a broken image.
//!
//! ```text
//! ┌─────────┬─────────┬─────────┐
//! │ a (1.5) │ b (0.5) │ c (1.0) │
//! ├─────────┤         ├─────────┤
//! │ d       │         │ e  ░░░  │  ← placeholder: signing failed
//! └─────────┴─────────┴─────────┘
//! ```

use crate::feed::Feed;
use crate::signing::subscribe::fallback;
use crate::signing::SignedUrlCache;
use crate::types::FeedItem;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filename of the rendered preview inside the output directory.
pub const PREVIEW_FILENAME: &str = "index.html";

const CSS: &str = r#"
:root { --gap: 12px; --bg: #111; --fg: #eee; --muted: #2a2a2a; }
* { box-sizing: border-box; }
body { margin: 0; padding: var(--gap); background: var(--bg); color: var(--fg); font: 14px/1.4 system-ui, sans-serif; }
header { display: flex; justify-content: space-between; margin-bottom: var(--gap); }
.feed { display: flex; gap: var(--gap); align-items: flex-start; }
.column { flex: 1 1 0; display: flex; flex-direction: column; gap: var(--gap); min-width: 0; }
.tile { position: relative; width: 100%; overflow: hidden; border-radius: 6px; background: var(--muted); }
.tile img, .tile video { display: block; width: 100%; height: 100%; object-fit: cover; }
.placeholder { display: flex; width: 100%; height: 100%; align-items: center; justify-content: center; color: #777; }
"#;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v"];

/// What was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSummary {
    pub path: PathBuf,
    pub columns: usize,
    pub items: usize,
    /// Tiles rendered as placeholders.
    pub unresolved: usize,
}

/// Resolve every distinct source in `items` through the cache.
///
/// Failed resolutions fall back to the source itself for plain http(s) URLs,
/// otherwise to `None`.
pub async fn resolve_sources(
    cache: &SignedUrlCache,
    items: &[FeedItem],
) -> HashMap<String, Option<String>> {
    cache
        .prefetch(items.iter().map(|item| Some(item.source.as_str())))
        .await;

    items
        .iter()
        .map(|item| {
            let state = cache.initial_state(Some(&item.source));
            let url = if state.is_loading {
                fallback(&item.source).resolved_url
            } else {
                state.resolved_url
            };
            (item.source.clone(), url)
        })
        .collect()
}

fn is_video(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

fn base_document(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (content)
            }
        }
    }
}

fn render_tile(item: &FeedItem, url: Option<&str>) -> Markup {
    let style = format!("aspect-ratio: {:.4}", item.effective_aspect_ratio());
    html! {
        div.tile data-id=(item.id) style=(style) {
            @match url {
                Some(url) if is_video(url) => {
                    video src=(url) muted loop playsinline preload="metadata" {}
                }
                Some(url) => {
                    img src=(url) alt=(item.id) loading="lazy";
                }
                None => {
                    div.placeholder { "unavailable" }
                }
            }
        }
    }
}

/// Render laid-out columns into a complete HTML page.
pub fn render_preview(
    title: &str,
    columns: &[Vec<&FeedItem>],
    resolved: &HashMap<String, Option<String>>,
) -> Markup {
    let total: usize = columns.iter().map(Vec::len).sum();
    let content = html! {
        header {
            h1 { (title) }
            span.meta { (total) " items · " (columns.len()) " columns" }
        }
        main.feed {
            @for column in columns {
                section.column {
                    @for item in column {
                        (render_tile(item, resolved.get(&item.source).and_then(|u| u.as_deref())))
                    }
                }
            }
        }
    };
    base_document(title, content)
}

/// Lay out `feed`, resolve its sources and write the preview to `output_dir`.
pub async fn generate_preview(
    feed: &mut Feed,
    cache: &SignedUrlCache,
    title: &str,
    output_dir: &Path,
) -> Result<PreviewSummary, GenerateError> {
    let resolved = resolve_sources(cache, feed.items()).await;
    let columns = feed.columns();
    let unresolved = columns
        .iter()
        .flatten()
        .filter(|item| resolved.get(&item.source).is_none_or(Option::is_none))
        .count();
    let items = columns.iter().map(Vec::len).sum();
    let column_count = columns.len();
    let page = render_preview(title, &columns, &resolved);

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(PREVIEW_FILENAME);
    std::fs::write(&path, page.into_string())?;

    Ok(PreviewSummary {
        path,
        columns: column_count,
        items,
        unresolved,
    })
}
