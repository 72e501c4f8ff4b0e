use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};

pub mod model;

pub use model::{CheckoutHandle, CheckoutMetadata, CheckoutSessionRequest};

/// Hosted-checkout provider API. Implemented by the real HTTP client and by
/// recording mocks in tests.
#[async_trait]
pub trait CheckoutService: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutHandle>;
}

#[derive(Clone)]
pub struct CheckoutClient {
    http: Client,
    base_url: Url,
    secret_key: String,
}

impl fmt::Debug for CheckoutClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CheckoutClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.checkout.api_base)
            .map_err(|e| Error::Gateway(format!("invalid checkout api_base: {e}")))?;
        Ok(Self::with_base_url(cfg.checkout.secret_key.clone(), base_url))
    }

    pub fn with_base_url(secret_key: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("zenbook/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            secret_key,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/checkout_sessions")
            .map_err(|e| Error::Gateway(format!("invalid checkout base URL: {e}")))?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .map_err(|e| Error::Gateway(format!("failed to build checkout request: {e}")))
    }

    async fn execute_create(&self, body: Value) -> Result<CheckoutHandle> {
        let request = self.build_request(&body)?;
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Gateway(format!("failed to reach checkout provider: {e}")))?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by checkout provider: {}", body);
            return Err(Error::Gateway(format!(
                "received 429 from checkout provider: {body}"
            )));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("checkout provider error - status: {}, body: {}", status, body);
            return Err(Error::Gateway(format!("checkout error {status}: {body}")));
        }

        res.json::<CheckoutHandle>()
            .await
            .map_err(|e| Error::Gateway(format!("invalid checkout response JSON: {e}")))
    }
}

#[async_trait]
impl CheckoutService for CheckoutClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutHandle> {
        let body = build_checkout_session_request(request);
        self.execute_create(body).await
    }
}

pub fn build_checkout_session_request(request: &CheckoutSessionRequest) -> Value {
    json!({
        "mode": "payment",
        "amount_minor": request.amount_minor,
        "currency": request.currency,
        "description": request.description,
        "success_url": request.success_url,
        "cancel_url": request.cancel_url,
        "metadata": {
            "booking_id": request.metadata.booking_id,
            "student_id": request.metadata.student_id,
            "teacher_id": request.metadata.teacher_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            amount_minor: 10_000,
            currency: "brl".into(),
            description: "60 minute lesson".into(),
            success_url: "https://app.example/ok".into(),
            cancel_url: "https://app.example/cancel".into(),
            metadata: CheckoutMetadata {
                booking_id: "bk-1".into(),
                student_id: "st-1".into(),
                teacher_id: "te-1".into(),
            },
        }
    }

    #[test]
    fn body_carries_amount_and_metadata() {
        let body = build_checkout_session_request(&sample_request());
        assert_eq!(body["mode"], "payment");
        assert_eq!(body["amount_minor"], 10_000);
        assert_eq!(body["currency"], "brl");
        assert_eq!(body["metadata"]["booking_id"], "bk-1");
        assert_eq!(body["metadata"]["student_id"], "st-1");
        assert_eq!(body["metadata"]["teacher_id"], "te-1");
    }

    #[test]
    fn build_request_sets_headers() {
        let client = CheckoutClient::with_base_url(
            "sk_test".into(),
            Url::parse("https://api.checkout.example/").unwrap(),
        );
        let body = build_checkout_session_request(&sample_request());
        let request = client.build_request(&body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/checkout_sessions");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer sk_test"
        );
        assert_eq!(
            headers
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
    }
}
