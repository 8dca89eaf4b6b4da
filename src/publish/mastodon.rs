use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{error_message, Destination, PublishError, REQUEST_TIMEOUT};
use crate::config::MastodonSettings;
use crate::render::TemplateSettings;

#[derive(Deserialize)]
struct Status {
    url: Option<String>,
}

/// Posts announcements as Mastodon statuses.
///
/// The enclosure URL is not attached separately; templates place `{url}`
/// in the body and the server turns it into a link card.
pub struct MastodonDestination {
    client: reqwest::Client,
    api_url: String,
    access_token: SecretString,
    template: TemplateSettings,
    enabled: bool,
}

impl MastodonDestination {
    pub fn new(settings: &MastodonSettings, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            access_token: SecretString::from(settings.access_token.expose_secret().to_string()),
            template: settings.template.clone(),
            enabled: settings.enabled,
        }
    }
}

#[async_trait]
impl Destination for MastodonDestination {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn template(&self) -> &TemplateSettings {
        &self.template
    }

    async fn publish(&self, body: &str, _enclosure_url: Option<&str>) -> Result<(), PublishError> {
        let url = format!("{}/api/v1/statuses", self.api_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&json!({ "status": body }));

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| PublishError::Timeout)??;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::Auth(error_message(&text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let posted: Status = response.json().await?;
        tracing::info!(
            url = posted.url.as_deref().unwrap_or("<unknown>"),
            "Published Mastodon status"
        );
        Ok(())
    }
}
