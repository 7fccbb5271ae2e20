use {
    crate::domain::error::PipelineError,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;
const FUTURE_SKEW_SECS: i64 = 60;

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, PipelineError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PipelineError::WebhookSignature("missing timestamp".into()))?
        .parse::<i64>()
        .map_err(|_| PipelineError::WebhookSignature("invalid timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PipelineError::WebhookSignature("missing v1 signature".into()));
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

/// Verify `header` against the raw body with any of `secrets` (live and test
/// endpoints sign with different secrets).
pub fn verify(payload: &str, header: &str, secrets: &[String], now: i64) -> Result<(), PipelineError> {
    let parsed = parse_header(header)?;

    let age = now - parsed.timestamp;
    if age > TIMESTAMP_TOLERANCE_SECS {
        return Err(PipelineError::WebhookSignature(format!(
            "timestamp too old ({age}s)"
        )));
    }
    if age < -FUTURE_SKEW_SECS {
        return Err(PipelineError::WebhookSignature(format!(
            "timestamp in the future ({age}s)"
        )));
    }

    let decoded: Vec<Vec<u8>> = parsed
        .signatures
        .iter()
        .filter_map(|s| hex::decode(s).ok())
        .collect();

    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        for candidate in &decoded {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|_| PipelineError::Config("invalid webhook secret".into()))?;
            mac.update(parsed.timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload.as_bytes());
            // constant-time comparison
            if mac.verify_slice(candidate).is_ok() {
                return Ok(());
            }
        }
    }

    Err(PipelineError::WebhookSignature("no matching signature".into()))
}

/// Header value for `payload` signed at `timestamp`.
pub fn sign(payload: &str, secret: &str, timestamp: i64) -> Result<String, PipelineError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PipelineError::Config("invalid webhook secret".into()))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}
