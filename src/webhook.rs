//! Payment provider webhook handling.
//!
//! The raw payload and its signature header are untrusted input. Signature
//! verification is a pure step that happens before the event is parsed or any
//! state is touched; only then is the typed event dispatched onto the booking
//! lifecycle. Every resolvable branch acknowledges receipt — the provider
//! must not retry events that can never match a booking here.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the event signature, `t=<unix-seconds>,v1=<hex-hmac>`.
/// The HMAC-SHA256 is computed over `"{t}.{payload}"` with the shared
/// webhook secret.
pub const SIGNATURE_HEADER: &str = "x-checkout-signature";

/// Computes the signature header value for a payload. Production events are
/// signed by the provider; this is used by tests and local tooling.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    format!("t={},v1={}", timestamp, hex::encode(digest))
}

/// Verifies the signature header against the shared secret. Comparison is
/// constant-time via the Mac verifier.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(Error::Authenticity)?;
    if signatures.is_empty() {
        return Err(Error::Authenticity);
    }

    for candidate in signatures {
        let Ok(candidate) = hex::decode(candidate) else {
            continue;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&candidate).is_ok() {
            return Ok(());
        }
    }
    Err(Error::Authenticity)
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EventMetadata {
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

/// Typed payment-provider events. Kinds this core does not know are parsed
/// into `Unknown` and acknowledged without action.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    CheckoutCompleted {
        checkout_id: String,
        #[serde(default)]
        payment_id: Option<String>,
        #[serde(default)]
        amount_minor: i64,
        #[serde(default)]
        metadata: EventMetadata,
    },
    CheckoutExpired {
        checkout_id: String,
        #[serde(default)]
        metadata: EventMetadata,
    },
    PaymentFailed {
        #[serde(default)]
        checkout_id: Option<String>,
        #[serde(default)]
        payment_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Verifies, parses, and applies one webhook delivery. `Ok(())` means the
/// event is acknowledged, including the deliberate no-action branches;
/// `Authenticity` means the caller must answer with a client error so only
/// genuine delivery failures are retried.
#[instrument(skip_all)]
pub async fn handle_event(
    pool: &Pool,
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
) -> Result<()> {
    let header = signature_header.ok_or(Error::Authenticity)?;
    verify_signature(payload, header, secret)?;

    let event: WebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| Error::Validation(format!("malformed event payload: {e}")))?;

    match event {
        WebhookEvent::CheckoutCompleted {
            checkout_id,
            payment_id,
            amount_minor,
            metadata,
        } => {
            let Some(booking_id) = metadata.booking_id else {
                // Not from this system's checkout flow; nothing to act on.
                warn!(%checkout_id, "checkout completed without booking metadata");
                return Ok(());
            };
            match db::record_payment_success(
                pool,
                &booking_id,
                amount_minor,
                payment_id.as_deref(),
                Some(&checkout_id),
            )
            .await?
            {
                Some(status) => {
                    info!(%booking_id, status = status.as_str(), "payment succeeded");
                }
                None => {
                    warn!(%booking_id, "checkout completed for unknown booking");
                }
            }
            Ok(())
        }
        WebhookEvent::CheckoutExpired {
            checkout_id,
            metadata,
        } => {
            if let Some(booking_id) = metadata.booking_id {
                let applied = db::cancel_booking_expired(pool, &booking_id).await?;
                info!(%booking_id, applied, "checkout expired");
            } else {
                warn!(%checkout_id, "checkout expired without booking metadata");
            }
            Ok(())
        }
        WebhookEvent::PaymentFailed {
            checkout_id,
            payment_id,
        } => {
            let Some(checkout_id) = checkout_id else {
                return Ok(());
            };
            let Some(booking) = db::find_booking_by_checkout_ref(pool, &checkout_id).await? else {
                warn!(%checkout_id, "payment failed for unknown checkout session");
                return Ok(());
            };
            // Refunds are not separately tracked; the failure row carries the
            // booking's original price.
            let applied = db::record_payment_failure(
                pool,
                &booking.id,
                booking.price_minor,
                payment_id.as_deref(),
                booking.checkout_ref.as_deref(),
            )
            .await?;
            info!(booking_id = %booking.id, applied, "payment failed");
            Ok(())
        }
        WebhookEvent::Unknown => Ok(()),
    }
}
