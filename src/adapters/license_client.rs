use {
    crate::domain::{
        error::PipelineError,
        license::{LicenseGrant, LicenseRequest},
        provider::{BoxFuture, LicenseService},
    },
    reqwest::{Client, StatusCode},
    std::time::Duration,
};

pub struct HttpLicenseService {
    client: Client,
    /// `None` disables issuance: every request answers `Ok(None)`.
    endpoint: Option<(String, String)>,
}

impl HttpLicenseService {
    pub fn new(
        base_url: Option<&str>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("license http client: {e}")))?;
        let endpoint = match (base_url, token) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => Some((
                format!("{}/licenses", url.trim_end_matches('/')),
                token.to_string(),
            )),
            _ => {
                tracing::warn!("license service not configured, licenses will not be issued");
                None
            }
        };
        Ok(Self { client, endpoint })
    }

    async fn issue_inner(&self, request: &LicenseRequest) -> Result<Option<LicenseGrant>, PipelineError> {
        let Some((url, token)) = &self.endpoint else {
            return Ok(None);
        };

        tracing::debug!(
            id = %request.id,
            tier = %request.tier,
            entitlements = request.entitlements.len(),
            "license request"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Idempotency-Key", &request.id)
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::LicenseIssuanceFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::LicenseIssuanceFailed(e.to_string()))?;
        if !status.is_success() {
            let excerpt: String = body.chars().take(500).collect();
            return Err(PipelineError::LicenseIssuanceFailed(format!(
                "license service responded {status}: {excerpt}"
            )));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }

        let grant: LicenseGrant = serde_json::from_str(&body).map_err(|e| {
            PipelineError::LicenseIssuanceFailed(format!("unexpected response shape: {e}"))
        })?;
        Ok(Some(grant))
    }
}

impl LicenseService for HttpLicenseService {
    fn issue<'a>(
        &'a self,
        request: &'a LicenseRequest,
    ) -> BoxFuture<'a, Result<Option<LicenseGrant>, PipelineError>> {
        Box::pin(self.issue_inner(request))
    }
}
