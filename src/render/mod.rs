//! Announcement text rendering.
//!
//! Turns an episode into the body of a social post:
//!
//! 1. [`prepare_description`] converts the feed's HTML description to plain
//!    text and cuts it to the destination's length limit
//! 2. a [`Renderer`] fills the destination's template with the episode fields

mod template;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::util::{strip_control_chars, truncate_description, unsmart_quotes};

pub use template::{TemplateRenderer, DEFAULT_BLUESKY_TEMPLATE, DEFAULT_MASTODON_TEMPLATE};

/// Wrap width handed to html2text. Large enough that it never wraps a post.
const WRAP_WIDTH: usize = 10_000;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template rendered to an empty post")]
    EmptyOutput,
}

/// Per-destination template configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    /// Template file on disk; `None` uses `default_template`
    pub template_file: Option<PathBuf>,
    /// Description limit in characters, before the ellipsis
    pub max_description_length: usize,
    /// Built-in template for destinations without a template file
    pub default_template: &'static str,
}

/// The values a template can reference.
#[derive(Debug, Clone, Copy)]
pub struct Announcement<'a> {
    pub podcast_name: &'a str,
    pub title: &'a str,
    /// Already prepared with [`prepare_description`]
    pub description: &'a str,
    /// Enclosure URL, or empty when the episode has none
    pub url: &'a str,
    pub duration: Option<Duration>,
}

pub trait Renderer: Send + Sync {
    fn render(
        &self,
        announcement: &Announcement<'_>,
        template: &TemplateSettings,
    ) -> Result<String, RenderError>;
}

/// Convert a feed description to post-ready plain text of at most
/// `max_chars` characters (plus the ellipsis when cut).
///
/// Links, emphasis and images are dropped rather than rendered as markup.
pub fn prepare_description(html: &str, max_chars: usize) -> String {
    let text = html2text::from_read_with_decorator(
        html.as_bytes(),
        WRAP_WIDTH,
        html2text::render::text_renderer::TrivialDecorator::new(),
    );
    let text = unsmart_quotes(&text);
    let text = strip_control_chars(&text);
    truncate_description(&text, max_chars)
}

/// Normalize an episode title for display.
pub fn prepare_title(title: &str) -> String {
    let title = unsmart_quotes(title);
    strip_control_chars(&title).trim().to_string()
}
