use {
    crate::domain::{
        error::PipelineError,
        provider::{BoxFuture, OpsAlert, OpsAlerter},
    },
    reqwest::Client,
    std::time::Duration,
};

/// Posts `{text}` to a Slack-compatible incoming webhook.
pub struct WebhookAlerter {
    client: Client,
    url: Option<String>,
}

impl WebhookAlerter {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("alert http client: {e}")))?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.is_empty()),
        })
    }

    async fn send_inner(&self, alert: &OpsAlert) -> Result<(), PipelineError> {
        let text = render(alert);
        let Some(url) = &self.url else {
            tracing::warn!(alert = %text, "ops alert webhook not configured");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("ops alert: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::Provider(format!(
                "ops alert webhook responded {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn render(alert: &OpsAlert) -> String {
    let mut text = format!(":rotating_light: {}", alert.title);
    for (key, value) in alert.context.iter() {
        text.push_str(&format!("\n• {key}: {}", value.to_provider_string()));
    }
    text
}

impl OpsAlerter for WebhookAlerter {
    fn send<'a>(&'a self, alert: &'a OpsAlert) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(self.send_inner(alert))
    }
}
