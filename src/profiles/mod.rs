//! Display names shown next to chat messages.

mod alias;

pub use alias::anonymous_alias;

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, warn};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct ChannelPayload {
    #[serde(default)]
    title: String,
}

/// Looks a user's channel title up in the channel catalog.
#[derive(Clone)]
pub struct DisplayNames {
    http_client: reqwest::Client,
    channel_api_base: Option<String>,
}

impl DisplayNames {
    pub fn new(channel_api_base: Option<String>) -> reqwest::Result<DisplayNames> {
        let http_client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()?;

        Ok(DisplayNames { http_client, channel_api_base })
    }

    /// Never fails: anything short of a non-blank title yields an anonymous alias.
    pub async fn resolve(&self, user_id: &str) -> String {
        match self.channel_title(user_id).await {
            Ok(Some(title)) => title,
            Ok(None) => anonymous_alias(),
            Err(err) => {
                warn!(user = user_id, error = %err, "display name lookup failed");
                anonymous_alias()
            }
        }
    }

    async fn channel_title(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        let Some(base) = &self.channel_api_base else {
            return Ok(None);
        };

        let url = format!("{base}/public/channels/{user_id}");
        let payload: ChannelPayload = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decode channel body")?;

        let title = payload.title.trim();
        debug!(user = user_id, title, "resolved display name");
        Ok((!title.is_empty()).then(|| title.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_catalog_falls_back_to_alias() {
        let names = DisplayNames::new(None).unwrap();
        let name = names.resolve("u1").await;
        assert_eq!(name.split(' ').count(), 2);
    }

    #[tokio::test]
    async fn unreachable_catalog_falls_back_to_alias() {
        // port 9 (discard) is closed on any sane test machine
        let names = DisplayNames::new(Some("http://127.0.0.1:9".to_owned())).unwrap();
        let name = names.resolve("u1").await;
        assert!(!name.is_empty());
    }
}
