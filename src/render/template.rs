use std::borrow::Cow;

use super::{Announcement, RenderError, Renderer, TemplateSettings};
use crate::util::format_duration;

/// Bluesky appends its own "Episode Download" link, so the URL stays out.
pub const DEFAULT_BLUESKY_TEMPLATE: &str = "New {podcast_name} episode: {title}\n\n{description}";

pub const DEFAULT_MASTODON_TEMPLATE: &str =
    "New {podcast_name} episode: {title}\n\n{description}\n\n{url}";

/// Fills `{placeholder}` templates.
///
/// Known placeholders are `{podcast_name}`, `{title}`, `{description}`,
/// `{url}` and `{duration}`. `{{` and `}}` produce literal braces. Anything
/// else between braces is copied through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    fn load<'t>(&self, template: &'t TemplateSettings) -> Result<Cow<'t, str>, RenderError> {
        match &template.template_file {
            Some(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| RenderError::TemplateRead {
                    path: path.clone(),
                    source,
                }),
            None => Ok(Cow::Borrowed(template.default_template)),
        }
    }
}

impl Renderer for TemplateRenderer {
    fn render(
        &self,
        announcement: &Announcement<'_>,
        template: &TemplateSettings,
    ) -> Result<String, RenderError> {
        let source = self.load(template)?;
        let body = fill(&source, announcement);
        let body = body.trim();

        if body.is_empty() {
            return Err(RenderError::EmptyOutput);
        }
        Ok(body.to_string())
    }
}

fn fill(source: &str, announcement: &Announcement<'_>) -> String {
    let mut out = String::with_capacity(source.len() + announcement.description.len());
    let mut rest = source;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let name = &tail[1..end];
                if let Some(value) = lookup(name, announcement) {
                    out.push_str(&value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        // Stray brace or unknown placeholder: copy one char and move on
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

fn lookup<'a>(name: &str, announcement: &Announcement<'a>) -> Option<Cow<'a, str>> {
    let value = match name {
        "podcast_name" => Cow::Borrowed(announcement.podcast_name),
        "title" => Cow::Borrowed(announcement.title),
        "description" => Cow::Borrowed(announcement.description),
        "url" => Cow::Borrowed(announcement.url),
        "duration" => Cow::Owned(
            announcement
                .duration
                .map(format_duration)
                .unwrap_or_default(),
        ),
        _ => return None,
    };
    Some(value)
}
