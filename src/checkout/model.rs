use serde::{Deserialize, Serialize};

/// Metadata attached to a checkout session so webhook events can be resolved
/// back to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub booking_id: String,
    pub student_id: String,
    pub teacher_id: String,
}

/// Everything the provider needs to open a hosted checkout page for one
/// pending payment attempt.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CheckoutMetadata,
}

/// Opaque reference plus redirect URL returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutHandle {
    pub id: String,
    pub url: String,
}
