//! Booking creation and lifecycle: conflict detection, checkout setup with a
//! compensating delete, and role-scoped listings.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::checkout::{CheckoutMetadata, CheckoutService, CheckoutSessionRequest};
use crate::config::Config;
use crate::db::{self, BookingFilter, Pool};
use crate::error::{Error, Result};
use crate::model::{Booking, BookingStatus, Caller, Role};

pub const MIN_DURATION_MINUTES: i64 = 30;
pub const MAX_DURATION_MINUTES: i64 = 240;

/// Buffer added on each side of a candidate booking when checking for
/// conflicts. Policy: back-to-back lessons for the same teacher need at least
/// an hour between them, not merely no exact overlap.
const CONFLICT_PAD_MINUTES: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub teacher_id: String,
    pub student_id: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_minor: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The padded window a candidate booking occupies for conflict purposes:
/// `[start - 1h, start + duration + 1h]`, bounds inclusive.
pub fn padded_window(
    start: DateTime<Utc>,
    duration_minutes: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let pad = Duration::minutes(CONFLICT_PAD_MINUTES);
    (start - pad, start + Duration::minutes(duration_minutes) + pad)
}

/// True when any PENDING/CONFIRMED booking for the teacher starts inside the
/// candidate's padded window. Two concurrent checks for the same slot can
/// both pass; the checkout step is the real financial gate and the losing
/// PENDING row is cancelled later.
pub async fn has_conflict(
    pool: &Pool,
    teacher_id: &str,
    candidate_start: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<bool> {
    let (window_start, window_end) = padded_window(candidate_start, duration_minutes);
    let hit = db::find_conflicting_booking(pool, teacher_id, window_start, window_end).await?;
    Ok(hit.is_some())
}

/// Creates a PENDING booking and opens a hosted checkout session for it. If
/// the checkout call fails the booking row is deleted again and
/// `PaymentSetup` is surfaced; that is the only path that hard-deletes a
/// booking.
#[instrument(skip_all)]
pub async fn create_booking(
    pool: &Pool,
    checkout: &dyn CheckoutService,
    cfg: &Config,
    caller: &Caller,
    input: NewBooking,
) -> Result<(Booking, crate::checkout::CheckoutHandle)> {
    if caller.role != Role::Student {
        return Err(Error::Authorization("only students can book lessons"));
    }
    if input.student_id != caller.id {
        return Err(Error::Authorization("students can only book for themselves"));
    }
    if input.duration_minutes < MIN_DURATION_MINUTES || input.duration_minutes > MAX_DURATION_MINUTES
    {
        return Err(Error::Validation(format!(
            "duration_minutes must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}"
        )));
    }
    if input.price_minor <= 0 {
        return Err(Error::Validation("price_minor must be positive".into()));
    }

    let teacher = db::get_user(pool, &input.teacher_id).await?;
    let teacher = match teacher {
        Some(user) if user.role == Role::Teacher => user,
        _ => return Err(Error::NotFound("teacher")),
    };
    if db::get_teacher_profile(pool, &teacher.id).await?.is_none() {
        return Err(Error::NotFound("teacher"));
    }

    if has_conflict(pool, &input.teacher_id, input.scheduled_start, input.duration_minutes).await? {
        return Err(Error::Conflict);
    }

    let mut booking = Booking {
        id: Uuid::new_v4().to_string(),
        student_id: input.student_id,
        teacher_id: input.teacher_id,
        scheduled_start: input.scheduled_start,
        duration_minutes: input.duration_minutes,
        price_minor: input.price_minor,
        notes: input.notes,
        status: BookingStatus::Pending,
        checkout_ref: None,
        created_at: Utc::now(),
    };
    db::insert_booking(pool, &booking).await?;

    let request = CheckoutSessionRequest {
        amount_minor: booking.price_minor,
        currency: cfg.checkout.currency.clone(),
        description: format!(
            "{} minute lesson with {} on {}",
            booking.duration_minutes,
            teacher.name,
            booking.scheduled_start.format("%Y-%m-%d %H:%M")
        ),
        success_url: format!("{}&booking_id={}", cfg.checkout.success_url, booking.id),
        cancel_url: cfg.checkout.cancel_url.clone(),
        metadata: CheckoutMetadata {
            booking_id: booking.id.clone(),
            student_id: booking.student_id.clone(),
            teacher_id: booking.teacher_id.clone(),
        },
    };

    let handle = match checkout.create_checkout_session(&request).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(?err, booking_id = %booking.id, "checkout setup failed; deleting booking");
            db::delete_booking(pool, &booking.id).await?;
            return Err(Error::PaymentSetup(err.to_string()));
        }
    };

    db::set_booking_checkout_ref(pool, &booking.id, &handle.id).await?;
    booking.checkout_ref = Some(handle.id.clone());
    info!(booking_id = %booking.id, checkout_id = %handle.id, "booking created");
    Ok((booking, handle))
}

/// Role-scoped listing: teachers see their own bookings, students theirs.
/// Explicit query filters narrow further.
pub async fn list_bookings(
    pool: &Pool,
    caller: &Caller,
    mut filter: BookingFilter,
) -> Result<Vec<Booking>> {
    match caller.role {
        Role::Teacher => {
            filter.teacher_id.get_or_insert_with(|| caller.id.clone());
        }
        Role::Student => {
            filter.student_id.get_or_insert_with(|| caller.id.clone());
        }
    }
    db::list_bookings(pool, &filter).await
}

/// Marks a confirmed lesson as held. Only the booking's teacher may trigger
/// it; the transition itself is idempotent.
#[instrument(skip_all)]
pub async fn complete_booking(pool: &Pool, caller: &Caller, booking_id: &str) -> Result<Booking> {
    let booking = db::get_booking(pool, booking_id)
        .await?
        .ok_or(Error::NotFound("booking"))?;
    if booking.teacher_id != caller.id {
        return Err(Error::Authorization("only the teacher can complete a lesson"));
    }
    if booking.status == BookingStatus::Pending {
        return Err(Error::InvalidState("PENDING"));
    }
    db::complete_booking(pool, booking_id).await?;
    db::get_booking(pool, booking_id)
        .await?
        .ok_or(Error::NotFound("booking"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn padded_window_extends_one_hour_each_side() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let (lo, hi) = padded_window(start, 60);
        assert_eq!(lo, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn padded_window_scales_with_duration() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let (lo, hi) = padded_window(start, 240);
        assert_eq!(lo, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap());
    }
}
