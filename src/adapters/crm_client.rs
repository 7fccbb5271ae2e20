use {
    crate::domain::{
        error::{CrmError, PipelineError},
        provider::{BoxFuture, CrmClient, CrmSyncRequest, CrmSyncResult},
    },
    reqwest::Client,
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

const API_VERSION: &str = "2021-07-28";
const CONTACT_SOURCE: &str = "Stripe Checkout";

#[derive(Debug, Clone)]
pub struct CrmSettings {
    pub base_url: String,
    pub token: String,
    pub location_id: String,
}

pub struct HttpCrmClient {
    client: Client,
    settings: Option<CrmSettings>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactUpsert<'a> {
    location_id: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    source: &'a str,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a [String],
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Deserialize)]
struct ContactUpsertResponse {
    contact: Option<ContactRef>,
}

#[derive(Deserialize)]
struct ContactRef {
    id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpportunityCreate<'a> {
    location_id: &'a str,
    contact_id: &'a str,
    pipeline_id: &'a str,
    #[serde(rename = "pipelineStageId")]
    stage_id: &'a str,
    name: String,
    status: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    monetary_value: Option<f64>,
}

impl HttpCrmClient {
    pub fn new(settings: Option<CrmSettings>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("crm http client: {e}")))?;
        if settings.is_none() {
            tracing::warn!("crm not configured, purchases will not be synced");
        }
        Ok(Self { client, settings })
    }

    async fn post<T: Serialize>(
        &self,
        settings: &CrmSettings,
        path: &str,
        body: &T,
    ) -> Result<String, CrmError> {
        let url = format!("{}{path}", settings.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&settings.token)
            .header("Version", API_VERSION)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CrmError::Timeout
                } else {
                    CrmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CrmError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(CrmError::Http {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }
        Ok(text)
    }

    async fn sync_inner(&self, request: &CrmSyncRequest) -> Result<CrmSyncResult, CrmError> {
        let Some(settings) = &self.settings else {
            return Err(CrmError::Config("crm credentials are not configured".into()));
        };

        let (first_name, last_name) = split_name(request.name.as_deref());
        let contact = ContactUpsert {
            location_id: &settings.location_id,
            email: &request.email,
            first_name,
            last_name,
            phone: request.phone.as_deref(),
            source: CONTACT_SOURCE,
            tags: &request.config.tags,
        };
        let body = self.post(settings, "/contacts/upsert", &contact).await?;
        let contact_id = serde_json::from_str::<ContactUpsertResponse>(&body)
            .ok()
            .and_then(|r| r.contact)
            .and_then(|c| c.id);

        let Some(contact_id) = contact_id else {
            tracing::warn!(offer_id = %request.offer_id, "crm contact upsert returned no id");
            return Ok(CrmSyncResult::default());
        };
        tracing::info!(offer_id = %request.offer_id, contact_id = %contact_id, "crm contact upserted");

        let (Some(pipeline_id), Some(stage_id)) = (
            request.config.pipeline_id.as_deref(),
            request.config.stage_id.as_deref(),
        ) else {
            return Ok(CrmSyncResult {
                contact_id: Some(contact_id),
                opportunity_created: false,
            });
        };

        let opportunity = OpportunityCreate {
            location_id: &settings.location_id,
            contact_id: &contact_id,
            pipeline_id,
            stage_id,
            name: request
                .config
                .opportunity_name
                .clone()
                .unwrap_or_else(|| format!("{} Purchase", request.offer_name)),
            status: "open",
            source: CONTACT_SOURCE,
            monetary_value: request.amount_total.map(|cents| cents.max(0) as f64 / 100.0),
        };
        self.post(settings, "/opportunities/", &opportunity).await?;
        tracing::info!(pipeline_id, "crm opportunity created");

        Ok(CrmSyncResult {
            contact_id: Some(contact_id),
            opportunity_created: true,
        })
    }
}

fn split_name(name: Option<&str>) -> (Option<&str>, Option<&str>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(char::is_whitespace) {
        Some((first, last)) => (Some(first), Some(last.trim())),
        None => (Some(name), None),
    }
}

impl CrmClient for HttpCrmClient {
    fn sync_purchase<'a>(
        &'a self,
        request: &'a CrmSyncRequest,
    ) -> BoxFuture<'a, Result<CrmSyncResult, CrmError>> {
        Box::pin(self.sync_inner(request))
    }
}
