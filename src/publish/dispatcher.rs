//! Sends one episode to every destination of a feed.

use super::Destination;
use crate::config::FeedSettings;
use crate::feed::Episode;
use crate::render::{prepare_description, prepare_title, Announcement, Renderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOutcome {
    Published,
    /// Rendered but not sent
    DryRun,
    /// Render or publish failed; the message is for the run summary
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationResult {
    pub destination: String,
    pub outcome: DestinationOutcome,
}

/// What happened to one episode across all destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub identifier: String,
    pub results: Vec<DestinationResult>,
}

impl DispatchReport {
    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, DestinationOutcome::Published))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DestinationOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&DestinationOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Render and publish `episode` to each enabled destination, in order.
///
/// Failures are logged and recorded per destination; they never stop the
/// remaining destinations. After a successful publish, destinations with a
/// renewable session get to persist it.
pub async fn dispatch(
    episode: &Episode,
    feed: &FeedSettings,
    destinations: &[Box<dyn Destination>],
    renderer: &dyn Renderer,
    dry_run: bool,
) -> DispatchReport {
    let title = prepare_title(&episode.title);
    let url = episode.enclosure_url.as_deref().unwrap_or("");
    let mut results = Vec::with_capacity(destinations.len());

    for destination in destinations {
        if !destination.enabled() {
            tracing::debug!(
                feed = %feed.short_name,
                destination = destination.name(),
                "Destination disabled, skipping"
            );
            continue;
        }

        let template = destination.template();
        let description = prepare_description(&episode.description, template.max_description_length);
        let announcement = Announcement {
            podcast_name: &feed.name,
            title: &title,
            description: &description,
            url,
            duration: episode.duration,
        };

        let outcome = match renderer.render(&announcement, template) {
            Err(e) => {
                tracing::error!(
                    feed = %feed.short_name,
                    destination = destination.name(),
                    episode = %episode.identifier,
                    error = %e,
                    "Failed to render announcement"
                );
                DestinationOutcome::Failed(e.to_string())
            }
            Ok(body) if dry_run => {
                tracing::info!(
                    feed = %feed.short_name,
                    destination = destination.name(),
                    episode = %episode.identifier,
                    body = %body,
                    "Dry run, not publishing"
                );
                DestinationOutcome::DryRun
            }
            Ok(body) => match destination.publish(&body, episode.enclosure_url.as_deref()).await {
                Ok(()) => {
                    tracing::info!(
                        feed = %feed.short_name,
                        destination = destination.name(),
                        episode = %episode.identifier,
                        title = %title,
                        "Announced episode"
                    );
                    if destination.uses_session() {
                        if let Err(e) = destination.persist_session().await {
                            tracing::warn!(
                                destination = destination.name(),
                                error = %e,
                                "Failed to persist session"
                            );
                        }
                    }
                    DestinationOutcome::Published
                }
                Err(e) => {
                    tracing::error!(
                        feed = %feed.short_name,
                        destination = destination.name(),
                        episode = %episode.identifier,
                        error = %e,
                        "Failed to publish announcement"
                    );
                    DestinationOutcome::Failed(e.to_string())
                }
            },
        };

        results.push(DestinationResult {
            destination: destination.name().to_string(),
            outcome,
        });
    }

    DispatchReport {
        identifier: episode.identifier.clone(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishError;
    use crate::render::{TemplateRenderer, TemplateSettings};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        bodies: Mutex<Vec<(String, Option<String>)>>,
        persisted: AtomicUsize,
    }

    struct FakeDestination {
        name: &'static str,
        fail: bool,
        enabled: bool,
        session: bool,
        template: TemplateSettings,
        calls: Arc<Calls>,
    }

    impl FakeDestination {
        fn new(name: &'static str, template: &'static str, max: usize) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let destination = Self {
                name,
                fail: false,
                enabled: true,
                session: false,
                template: TemplateSettings {
                    template_file: None,
                    max_description_length: max,
                    default_template: template,
                },
                calls: calls.clone(),
            };
            (destination, calls)
        }
    }

    #[async_trait]
    impl Destination for FakeDestination {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn template(&self) -> &TemplateSettings {
            &self.template
        }

        fn uses_session(&self) -> bool {
            self.session
        }

        async fn publish(&self, body: &str, enclosure_url: Option<&str>) -> Result<(), PublishError> {
            self.calls
                .bodies
                .lock()
                .unwrap()
                .push((body.to_string(), enclosure_url.map(str::to_string)));
            if self.fail {
                return Err(PublishError::Auth("bad credentials".to_string()));
            }
            Ok(())
        }

        async fn persist_session(&self) -> Result<(), PublishError> {
            self.calls.persisted.fetch_add(1, Ordering::SeqCst);
            Err(PublishError::Session("disk full".to_string()))
        }
    }

    fn episode() -> Episode {
        Episode {
            identifier: "ep-1".to_string(),
            enclosure_url: Some("https://cdn.example.com/1.mp3".to_string()),
            title: "Pilot \u{201C}One\u{201D}".to_string(),
            description: "<p>An <b>excellent</b> first episode</p>".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            duration: None,
        }
    }

    fn feed() -> FeedSettings {
        FeedSettings::new("Example Show", "example", "https://example.com/feed.xml")
    }

    #[tokio::test]
    async fn test_each_destination_gets_its_own_rendering() {
        let (a, a_calls) = FakeDestination::new("a", "{podcast_name}: {title} - {description}", 200);
        let (b, b_calls) = FakeDestination::new("b", "{description} {url}", 10);
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a), Box::new(b)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), false).await;

        assert_eq!(report.identifier, "ep-1");
        assert_eq!(report.published(), 2);
        assert_eq!(report.failed(), 0);

        let a_bodies = a_calls.bodies.lock().unwrap();
        assert_eq!(
            a_bodies[0].0,
            "Example Show: Pilot \"One\" - An excellent first episode"
        );
        assert_eq!(a_bodies[0].1.as_deref(), Some("https://cdn.example.com/1.mp3"));

        let b_bodies = b_calls.bodies.lock().unwrap();
        assert_eq!(b_bodies[0].0, "An excelle... https://cdn.example.com/1.mp3");
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (mut a, a_calls) = FakeDestination::new("a", "{title}", 100);
        a.fail = true;
        let (b, b_calls) = FakeDestination::new("b", "{title}", 100);
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a), Box::new(b)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), false).await;

        assert_eq!(report.published(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.results[0].outcome,
            DestinationOutcome::Failed("Authentication failed: bad credentials".to_string())
        );
        assert_eq!(report.results[1].outcome, DestinationOutcome::Published);
        assert_eq!(a_calls.bodies.lock().unwrap().len(), 1);
        assert_eq!(b_calls.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_renders_but_never_publishes() {
        let (a, a_calls) = FakeDestination::new("a", "{title}", 100);
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), true).await;

        assert_eq!(report.results[0].outcome, DestinationOutcome::DryRun);
        assert!(a_calls.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_is_isolated() {
        let (mut a, a_calls) = FakeDestination::new("a", "{title}", 100);
        a.template.template_file = Some("/nonexistent/podcast-bot/template.txt".into());
        let (b, _) = FakeDestination::new("b", "{title}", 100);
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a), Box::new(b)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), false).await;

        assert!(matches!(report.results[0].outcome, DestinationOutcome::Failed(_)));
        assert_eq!(report.results[1].outcome, DestinationOutcome::Published);
        assert!(a_calls.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_destination_is_skipped() {
        let (mut a, a_calls) = FakeDestination::new("a", "{title}", 100);
        a.enabled = false;
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), false).await;

        assert!(report.results.is_empty());
        assert!(a_calls.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_persisted_after_success_and_failure_ignored() {
        let (mut a, a_calls) = FakeDestination::new("a", "{title}", 100);
        a.session = true;
        let (mut b, b_calls) = FakeDestination::new("b", "{title}", 100);
        b.session = true;
        b.fail = true;
        let destinations: Vec<Box<dyn Destination>> = vec![Box::new(a), Box::new(b)];

        let report = dispatch(&episode(), &feed(), &destinations, &TemplateRenderer::new(), false).await;

        // Persisting failed for "a" but the publish still counts
        assert_eq!(report.results[0].outcome, DestinationOutcome::Published);
        assert_eq!(a_calls.persisted.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.persisted.load(Ordering::SeqCst), 0);
    }
}
