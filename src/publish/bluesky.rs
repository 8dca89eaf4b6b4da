use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{error_message, Destination, PublishError, REQUEST_TIMEOUT};
use crate::clock::{Clock, SystemClock};
use crate::config::BlueskySettings;
use crate::render::TemplateSettings;
use crate::util::write_private_atomic;

/// Link text appended under every post; the facet points it at the enclosure.
const LINK_TEXT: &str = "Episode Download";

/// AT Protocol session tokens, in the wire format of `createSession`.
#[derive(Clone, Serialize, Deserialize)]
struct Session {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    #[serde(rename = "refreshJwt")]
    refresh_jwt: String,
    handle: String,
    did: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .field("access_jwt", &"[REDACTED]")
            .field("refresh_jwt", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct CreatedRecord {
    uri: String,
}

/// Posts announcements to a Bluesky account over XRPC.
///
/// The session is created lazily on the first publish and reused for the
/// rest of the run. With a `session_file` the previous run's session is
/// refreshed instead of logging in again.
pub struct BlueskyDestination {
    client: reqwest::Client,
    api_url: String,
    username: String,
    app_password: SecretString,
    session_file: Option<PathBuf>,
    template: TemplateSettings,
    enabled: bool,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<Session>>,
}

impl BlueskyDestination {
    pub fn new(settings: &BlueskySettings, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            app_password: SecretString::from(settings.app_password.expose_secret().to_string()),
            session_file: settings.session_file.clone(),
            template: settings.template.clone(),
            enabled: settings.enabled,
            clock: Arc::new(SystemClock),
            session: Mutex::new(None),
        }
    }

    /// Stamp `createdAt` on posts from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn ensure_session(&self) -> Result<Session, PublishError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = match self.load_stored_session() {
            Some(stored) => match self.refresh_session(&stored).await {
                Ok(session) => {
                    tracing::debug!(handle = %session.handle, "Refreshed stored Bluesky session");
                    session
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored Bluesky session could not be refreshed, logging in");
                    self.create_session().await?
                }
            },
            None => self.create_session().await?,
        };

        *guard = Some(session.clone());
        Ok(session)
    }

    fn load_stored_session(&self) -> Option<Session> {
        let path = self.session_file.as_ref()?;
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No stored Bluesky session");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read Bluesky session file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed Bluesky session file");
                None
            }
        }
    }

    async fn create_session(&self) -> Result<Session, PublishError> {
        let body = json!({
            "identifier": self.username,
            "password": self.app_password.expose_secret(),
        });

        let session: Session = self
            .xrpc("com.atproto.server.createSession", None, Some(&body))
            .await
            .map_err(|e| match e {
                PublishError::HttpStatus { status, message } => {
                    PublishError::Auth(format!("createSession returned {status}: {message}"))
                }
                other => other,
            })?;

        tracing::info!(handle = %session.handle, "Logged in to Bluesky");
        Ok(session)
    }

    async fn refresh_session(&self, session: &Session) -> Result<Session, PublishError> {
        self.xrpc(
            "com.atproto.server.refreshSession",
            Some(&session.refresh_jwt),
            None,
        )
        .await
    }

    async fn create_record(&self, session: &Session, record: &Value) -> Result<(), PublishError> {
        let body = json!({
            "repo": session.did,
            "collection": "app.bsky.feed.post",
            "record": record,
        });

        let created: CreatedRecord = self
            .xrpc("com.atproto.repo.createRecord", Some(&session.access_jwt), Some(&body))
            .await?;

        tracing::info!(uri = %created.uri, "Published Bluesky post");
        Ok(())
    }

    async fn xrpc<T: DeserializeOwned>(
        &self,
        method: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T, PublishError> {
        let url = format!("{}/xrpc/{}", self.api_url, method);
        let mut request = self.client.post(&url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| PublishError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Destination for BlueskyDestination {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn template(&self) -> &TemplateSettings {
        &self.template
    }

    fn uses_session(&self) -> bool {
        self.session_file.is_some()
    }

    async fn publish(&self, body: &str, enclosure_url: Option<&str>) -> Result<(), PublishError> {
        let record = post_record(body, enclosure_url, self.clock.now());
        let session = self.ensure_session().await?;

        match self.create_record(&session, &record).await {
            Err(PublishError::HttpStatus { status, message })
                if status == 400 && message.starts_with("ExpiredToken") =>
            {
                tracing::info!("Bluesky access token expired, refreshing session");
                let refreshed = self.refresh_session(&session).await?;
                *self.session.lock().await = Some(refreshed.clone());
                self.create_record(&refreshed, &record).await
            }
            other => other,
        }
    }

    async fn persist_session(&self) -> Result<(), PublishError> {
        let Some(path) = &self.session_file else {
            return Ok(());
        };
        let Some(session) = self.session.lock().await.clone() else {
            return Ok(());
        };

        let content =
            serde_json::to_vec_pretty(&session).map_err(|e| PublishError::Session(e.to_string()))?;
        write_private_atomic(path, &content)
            .map_err(|e| PublishError::Session(format!("{}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "Saved Bluesky session");
        Ok(())
    }
}

/// Build an `app.bsky.feed.post` record.
///
/// With an enclosure the text gets a trailing "Episode Download" line and a
/// link facet over it. Facet offsets are UTF-8 byte positions.
fn post_record(body: &str, enclosure_url: Option<&str>, created_at: DateTime<Utc>) -> Value {
    let created_at = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);

    match enclosure_url {
        Some(url) => {
            let text = format!("{body}\n{LINK_TEXT}");
            let byte_start = body.len() + 1;
            let byte_end = text.len();
            json!({
                "$type": "app.bsky.feed.post",
                "text": text,
                "createdAt": created_at,
                "facets": [{
                    "index": { "byteStart": byte_start, "byteEnd": byte_end },
                    "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": url }],
                }],
            })
        }
        None => json!({
            "$type": "app.bsky.feed.post",
            "text": body,
            "createdAt": created_at,
        }),
    }
}
