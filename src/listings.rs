//! Marketplace listings: teacher-posted time slots and student class
//! requests. Plain CRUD with ownership checks; bookings against a slot go
//! through the booking module.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use crate::booking::{MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};
use crate::db::{self, ClassRequestFilter, Pool, PostedTimeFilter};
use crate::error::{Error, Result};
use crate::model::{Caller, ClassRequest, Modality, PostedTime, Role};

#[derive(Debug, Clone, Deserialize)]
pub struct NewPostedTime {
    pub teacher_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub modality: Modality,
    pub price_minor: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClassRequest {
    pub student_id: String,
    pub modality: Modality,
    #[serde(default)]
    pub preferred_start: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    #[serde(default)]
    pub max_price_minor: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[instrument(skip_all)]
pub async fn post_time(pool: &Pool, caller: &Caller, input: NewPostedTime) -> Result<PostedTime> {
    if caller.role != Role::Teacher {
        return Err(Error::Authorization("only teachers can post time slots"));
    }
    if input.teacher_id != caller.id {
        return Err(Error::Authorization("teachers can only post their own slots"));
    }
    if input.price_minor <= 0 {
        return Err(Error::Validation("price_minor must be positive".into()));
    }
    if input.ends_at <= input.starts_at {
        return Err(Error::Validation("ends_at must be after starts_at".into()));
    }

    let mut posted = PostedTime {
        id: 0,
        teacher_id: input.teacher_id,
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        modality: input.modality,
        price_minor: input.price_minor,
        description: input.description,
        contact_phone: input.contact_phone,
        contact_email: input.contact_email,
        is_available: true,
        created_at: Utc::now(),
    };
    posted.id = db::insert_posted_time(pool, &posted).await?;
    Ok(posted)
}

/// Teachers only see their own slots; students browse everyone's.
pub async fn list_posted_times(
    pool: &Pool,
    caller: &Caller,
    mut filter: PostedTimeFilter,
) -> Result<Vec<PostedTime>> {
    if caller.role == Role::Teacher {
        filter.teacher_id = Some(caller.id.clone());
    }
    db::list_posted_times(pool, &filter).await
}

#[instrument(skip_all)]
pub async fn remove_posted_time(pool: &Pool, caller: &Caller, id: i64) -> Result<()> {
    let posted = db::get_posted_time(pool, id)
        .await?
        .ok_or(Error::NotFound("posted time"))?;
    if posted.teacher_id != caller.id {
        return Err(Error::Authorization("only the owner can remove a slot"));
    }
    db::delete_posted_time(pool, id).await
}

#[instrument(skip_all)]
pub async fn create_class_request(
    pool: &Pool,
    caller: &Caller,
    input: NewClassRequest,
) -> Result<ClassRequest> {
    if caller.role != Role::Student {
        return Err(Error::Authorization("only students can request classes"));
    }
    if input.student_id != caller.id {
        return Err(Error::Authorization(
            "students can only request for themselves",
        ));
    }
    if input.duration_minutes < MIN_DURATION_MINUTES || input.duration_minutes > MAX_DURATION_MINUTES
    {
        return Err(Error::Validation(format!(
            "duration_minutes must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}"
        )));
    }
    if matches!(input.max_price_minor, Some(p) if p <= 0) {
        return Err(Error::Validation("max_price_minor must be positive".into()));
    }

    let mut request = ClassRequest {
        id: 0,
        student_id: input.student_id,
        modality: input.modality,
        preferred_start: input.preferred_start,
        duration_minutes: input.duration_minutes,
        max_price_minor: input.max_price_minor,
        description: input.description,
        contact_phone: input.contact_phone,
        contact_email: input.contact_email,
        is_active: true,
        created_at: Utc::now(),
    };
    request.id = db::insert_class_request(pool, &request).await?;
    Ok(request)
}

/// Students only see their own requests; teachers browse everyone's.
pub async fn list_class_requests(
    pool: &Pool,
    caller: &Caller,
    mut filter: ClassRequestFilter,
) -> Result<Vec<ClassRequest>> {
    if caller.role == Role::Student {
        filter.student_id = Some(caller.id.clone());
    }
    db::list_class_requests(pool, &filter).await
}

#[instrument(skip_all)]
pub async fn close_class_request(pool: &Pool, caller: &Caller, id: i64) -> Result<ClassRequest> {
    let request = db::get_class_request(pool, id)
        .await?
        .ok_or(Error::NotFound("class request"))?;
    if request.student_id != caller.id {
        return Err(Error::Authorization("only the owner can close a request"));
    }
    db::set_class_request_active(pool, id, false).await?;
    db::get_class_request(pool, id)
        .await?
        .ok_or(Error::NotFound("class request"))
}
