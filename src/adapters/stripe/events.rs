use {
    crate::domain::{
        checkout::CheckoutSource,
        error::PipelineError,
        id::{EventId, PaymentRef, ProviderSessionId},
        metadata::Metadata,
        order::{NormalizedOrder, PaymentUpdate},
    },
    serde::Deserialize,
    std::collections::HashMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    PaymentIntentCanceled,
    Unhandled,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "payment_intent.canceled" => Self::PaymentIntentCanceled,
            _ => Self::Unhandled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    fn object<T: for<'de> Deserialize<'de>>(&self) -> Result<T, PipelineError> {
        T::deserialize(&self.data.object).map_err(|e| {
            PipelineError::MalformedPayload(format!("{} object: {e}", self.event_type))
        })
    }
}

/// Expandable reference: either a bare id or the expanded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TermsOfService {
    terms_of_service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    payment_intent: Option<IdOrObject>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    client_reference_id: Option<String>,
    metadata: Option<HashMap<String, String>>,
    consent: Option<TermsOfService>,
    consent_collection: Option<TermsOfService>,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    amount: Option<i64>,
    amount_received: Option<i64>,
    currency: Option<String>,
    status: Option<String>,
    receipt_email: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    metadata: Option<HashMap<String, String>>,
    last_payment_error: Option<PaymentError>,
}

/// Parse the verified body. Returns the typed envelope and the raw JSON kept
/// for audit.
pub fn parse_event(body: &str) -> Result<(StripeEvent, serde_json::Value), PipelineError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let event = StripeEvent::deserialize(&raw)
        .map_err(|e| PipelineError::MalformedPayload(format!("invalid event envelope: {e}")))?;
    Ok((event, raw))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `checkout.session.completed` → provider-agnostic order.
pub fn normalize_checkout_session(
    event: &StripeEvent,
    raw_event: serde_json::Value,
) -> Result<NormalizedOrder, PipelineError> {
    let session: CheckoutSessionObject = event.object()?;
    let event_id = EventId::new(event.id.as_str())?;
    let provider_session_id = ProviderSessionId::new(session.id.as_str())?;

    let mut metadata = session
        .metadata
        .as_ref()
        .map(Metadata::from_provider_strings)
        .unwrap_or_default();

    if let Some(status) = session.consent.as_ref().and_then(|c| c.terms_of_service.as_deref()) {
        metadata.insert("stripeTermsOfService", status);
        if status == "accepted" {
            metadata.insert("tosAccepted", "true");
        }
    }
    if let Some(required) = session
        .consent_collection
        .as_ref()
        .and_then(|c| c.terms_of_service.as_deref())
    {
        metadata.insert("stripeTermsOfServiceRequirement", required);
    }
    if let Some(reference) = non_empty(session.client_reference_id.as_deref()) {
        metadata.insert("clientReferenceId", reference);
    }

    let offer_id = non_empty(metadata.get_str("offerId"))
        .or_else(|| non_empty(metadata.get_str("productSlug")))
        .or_else(|| non_empty(session.client_reference_id.as_deref()));
    let lander_id = non_empty(metadata.get_str("landerId"))
        .or_else(|| non_empty(metadata.get_str("productSlug")))
        .or_else(|| offer_id.clone());

    // Zero-amount sessions carry no payment intent; the session id stands in.
    let payment_ref = match &session.payment_intent {
        Some(pi) => PaymentRef::new(pi.id())?,
        None => PaymentRef::new(session.id.as_str())?,
    };

    let details = session.customer_details.unwrap_or_default();
    let customer_email = non_empty(details.email.as_deref())
        .or_else(|| non_empty(session.customer_email.as_deref()))
        .map(|e| e.to_lowercase());
    let customer_name = non_empty(details.name.as_deref())
        .or_else(|| non_empty(metadata.get_str("customerName")));

    Ok(NormalizedOrder {
        event_id: event_id.to_string(),
        event_type: event.event_type.clone(),
        payment_ref,
        provider_session_id,
        offer_id,
        lander_id,
        customer_email,
        customer_name,
        customer_phone: non_empty(details.phone.as_deref()),
        amount_total: session.amount_total,
        currency: session.currency.map(|c| c.to_lowercase()),
        payment_status: session.payment_status,
        payment_method: session.payment_method_types.into_iter().next(),
        metadata,
        source: CheckoutSource::Stripe,
        raw_event,
    })
}

/// `payment_intent.*` → payment update for the owning session.
pub fn payment_update(event: &StripeEvent) -> Result<PaymentUpdate, PipelineError> {
    let pi: PaymentIntentObject = event.object()?;
    let metadata = pi
        .metadata
        .as_ref()
        .map(Metadata::from_provider_strings)
        .unwrap_or_default();

    Ok(PaymentUpdate {
        event_type: event.event_type.clone(),
        payment_ref: PaymentRef::new(pi.id.as_str())?,
        amount: pi.amount_received.or(pi.amount),
        currency: pi.currency.map(|c| c.to_lowercase()),
        status: pi.status,
        customer_email: non_empty(pi.receipt_email.as_deref()).map(|e| e.to_lowercase()),
        payment_method: pi.payment_method_types.into_iter().next(),
        failure_message: pi.last_payment_error.and_then(|e| e.message),
        metadata,
    })
}
