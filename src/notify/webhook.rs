//! Signed JSON webhook delivery

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use super::{MatchEvent, Notifier, NotifyError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix seconds>,v1=<hex hmac>`
pub const SIGNATURE_HEADER: &str = "X-Arena-Signature";

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    sent_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    event: &'a MatchEvent,
}

/// Posts every event to a configured URL. Delivery happens on a spawned task;
/// failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            secret,
        }
    }

    async fn deliver(&self, event: MatchEvent) -> Result<(), NotifyError> {
        let now = chrono::Utc::now();
        let body = serde_json::to_string(&Envelope {
            sent_at: now,
            event: &event,
        })?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(&body, secret, now.timestamp())?);
        }

        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }
        debug!(event = event.kind(), "Webhook delivered");
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: MatchEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event = event.kind(), "No runtime available, webhook dropped");
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            let kind = event.kind();
            if let Err(e) = this.deliver(event).await {
                warn!(event = kind, error = %e, "Webhook delivery failed");
            }
        });
    }
}

/// Signature header value for `payload` sent at `timestamp`
pub fn sign(payload: &str, secret: &str, timestamp: i64) -> Result<String, NotifyError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| NotifyError::InvalidKey)?;
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a signature header produced by [`sign`]. Receivers use this.
pub fn verify(payload: &str, header: &str, secret: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let Some(ts) = timestamp.and_then(|t| t.parse::<i64>().ok()) else {
        return false;
    };
    match sign(payload, secret, ts) {
        Ok(expected) => signatures
            .iter()
            .any(|sig| expected.ends_with(&format!("v1={}", sig))),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameVariant;
    use uuid::Uuid;

    #[test]
    fn signatures_verify() {
        let header = sign("{\"a\":1}", "s3cret", 1_700_000_000).unwrap();
        assert!(header.starts_with("t=1700000000,v1="));
        assert!(verify("{\"a\":1}", &header, "s3cret"));
        assert!(!verify("{\"a\":2}", &header, "s3cret"));
        assert!(!verify("{\"a\":1}", &header, "other"));
        assert!(!verify("{\"a\":1}", "v1=deadbeef", "s3cret"));
    }

    #[test]
    fn envelope_flattens_the_event() {
        let event = MatchEvent::MatchEnded {
            match_id: Uuid::nil(),
            variant: GameVariant::Sumo,
            ranking: crate::matchmaking::Ranking::Ranked,
            winner: None,
            duration_secs: 12,
        };
        let json = serde_json::to_value(Envelope {
            sent_at: chrono::Utc::now(),
            event: &event,
        })
        .unwrap();
        assert_eq!(json["event"], "match_ended");
        assert_eq!(json["variant"], "sumo");
        assert_eq!(json["ranking"], "ranked");
        assert!(json["winner"].is_null());
        assert!(json["sent_at"].is_string());
    }

    #[test]
    fn notify_without_runtime_is_a_no_op() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", None);
        notifier.notify(MatchEvent::MatchEnded {
            match_id: Uuid::nil(),
            variant: GameVariant::Sumo,
            ranking: crate::matchmaking::Ranking::Unranked,
            winner: None,
            duration_secs: 0,
        });
    }
}
