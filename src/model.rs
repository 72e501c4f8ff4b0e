use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STUDENT" => Some(Role::Student),
            "TEACHER" => Some(Role::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Single source of truth for the booking lifecycle. Payment events may be
    /// delivered more than once, so illegal pairs are a `Noop`, never an error.
    /// A CONFIRMED booking is never demoted back to CANCELLED by a late
    /// expiry/failure event.
    pub fn apply(self, event: BookingEvent) -> Transition {
        use BookingEvent::*;
        use BookingStatus::*;
        match (self, event) {
            (Pending, PaymentSucceeded) => Transition::Apply(Confirmed),
            (Pending, CheckoutExpired) | (Pending, PaymentFailed) => Transition::Apply(Cancelled),
            (Confirmed, LessonCompleted) => Transition::Apply(Completed),
            _ => Transition::Noop,
        }
    }
}

/// Events that drive booking transitions. The first three originate from the
/// payment provider; `LessonCompleted` is triggered externally once the
/// scheduled time has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    PaymentSucceeded,
    CheckoutExpired,
    PaymentFailed,
    LessonCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply(BookingStatus),
    Noop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Yoga,
    Meditation,
    Pilates,
    Fitness,
    Dance,
    Other,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Yoga => "YOGA",
            Modality::Meditation => "MEDITATION",
            Modality::Pilates => "PILATES",
            Modality::Fitness => "FITNESS",
            Modality::Dance => "DANCE",
            Modality::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "YOGA" => Some(Modality::Yoga),
            "MEDITATION" => Some(Modality::Meditation),
            "PILATES" => Some(Modality::Pilates),
            "FITNESS" => Some(Modality::Fitness),
            "DANCE" => Some(Modality::Dance),
            "OTHER" => Some(Modality::Other),
            _ => None,
        }
    }
}

/// Pre-authenticated request identity. Credential validation happens in the
/// external identity provider; by the time a request reaches this core the
/// caller is already resolved to an id and a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub user_id: String,
    pub bio: Option<String>,
    pub specialties: Option<String>,
    pub hourly_rate_minor: Option<i64>,
    pub rating: f64,
    pub total_reviews: i64,
}

/// A scheduled, priced lesson between one student and one teacher. Prices are
/// carried in currency minor units (cents) end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_minor: i64,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub checkout_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only payment outcome record. Retried webhook deliveries produce
/// additional rows; an existing row is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub booking_id: String,
    pub amount_minor: i64,
    pub status: PaymentStatus,
    pub payment_ref: Option<String>,
    pub checkout_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub booking_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRequest {
    pub id: i64,
    pub student_id: String,
    pub modality: Modality,
    pub preferred_start: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub max_price_minor: Option<i64>,
    pub description: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedTime {
    pub id: i64,
    pub teacher_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub modality: Modality,
    pub price_minor: i64,
    pub description: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}
