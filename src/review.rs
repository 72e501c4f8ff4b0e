//! Reviews and the teacher rating aggregate.

use serde::Deserialize;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::error::{Error, Result};
use crate::model::{BookingStatus, Caller, Review, Role};

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub booking_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Records a review for a completed lesson, then recomputes the teacher's
/// aggregate rating from all of the teacher's reviews. Preconditions are
/// checked in order and fail fast: booking exists, caller owns it, lesson is
/// completed, not yet reviewed.
#[instrument(skip_all)]
pub async fn record_review(pool: &Pool, caller: &Caller, input: NewReview) -> Result<Review> {
    if caller.role != Role::Student {
        return Err(Error::Authorization("only students can review lessons"));
    }
    if !(1..=5).contains(&input.rating) {
        return Err(Error::Validation("rating must be between 1 and 5".into()));
    }

    let booking = db::get_booking(pool, &input.booking_id)
        .await?
        .ok_or(Error::NotFound("booking"))?;
    if booking.student_id != caller.id {
        return Err(Error::Authorization("students can only review their own lessons"));
    }
    if booking.status != BookingStatus::Completed {
        return Err(Error::InvalidState(booking.status.as_str()));
    }
    if db::get_review_for_booking(pool, &booking.id).await?.is_some() {
        return Err(Error::Duplicate);
    }

    let review = db::insert_review_and_recompute(
        pool,
        &booking.id,
        &caller.id,
        &booking.teacher_id,
        input.rating,
        input.comment.as_deref(),
    )
    .await?;
    info!(booking_id = %booking.id, teacher_id = %booking.teacher_id, "review recorded");
    Ok(review)
}

/// Lists reviews by teacher or by booking; at least one filter is required.
pub async fn list_reviews(
    pool: &Pool,
    teacher_id: Option<&str>,
    booking_id: Option<&str>,
) -> Result<Vec<Review>> {
    if teacher_id.is_none() && booking_id.is_none() {
        return Err(Error::Validation(
            "teacher_id or booking_id is required".into(),
        ));
    }
    db::list_reviews(pool, teacher_id, booking_id).await
}
