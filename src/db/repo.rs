use super::model::{BookingFilter, ClassRequestFilter, PostedTimeFilter};
use crate::error::{Error, Result};
use crate::model::{
    Booking, BookingEvent, BookingStatus, ClassRequest, Modality, Payment, PaymentStatus,
    PostedTime, Review, Role, TeacherProfile, Transition, User,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Internal(format!("migration failed: {e}")))?;
    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = Role::parse(&role_str)
        .ok_or_else(|| Error::Internal(format!("user has unknown role {role_str}")))?;
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        role,
        created_at: row.get("created_at"),
    })
}

fn booking_from_row(row: &SqliteRow) -> Result<Booking> {
    let status_str: String = row.get("status");
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("booking has unknown status {status_str}")))?;
    Ok(Booking {
        id: row.get("id"),
        student_id: row.get("student_id"),
        teacher_id: row.get("teacher_id"),
        scheduled_start: row.get("scheduled_start"),
        duration_minutes: row.get("duration_minutes"),
        price_minor: row.get("price_minor"),
        notes: row.get("notes"),
        status,
        checkout_ref: row.get("checkout_ref"),
        created_at: row.get("created_at"),
    })
}

fn modality_from_row(row: &SqliteRow) -> Result<Modality> {
    let s: String = row.get("modality");
    Modality::parse(&s).ok_or_else(|| Error::Internal(format!("unknown modality {s}")))
}

const BOOKING_COLUMNS: &str = "id, student_id, teacher_id, scheduled_start, duration_minutes, \
     price_minor, notes, status, checkout_ref, created_at";

/// Creates the user row and, for teachers, an empty profile in one
/// transaction. Duplicate id/email surfaces as `Duplicate`.
#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, user: &User) -> Result<()> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        "INSERT INTO users (id, name, email, phone, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(user.role.as_str())
    .bind(user.created_at)
    .execute(&mut *tx)
    .await;
    match res {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Err(Error::Duplicate),
        Err(e) => return Err(e.into()),
    }
    if user.role == Role::Teacher {
        sqlx::query("INSERT INTO teacher_profiles (user_id) VALUES (?)")
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, email, phone, role, created_at FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_teacher_profile(pool: &Pool, user_id: &str) -> Result<Option<TeacherProfile>> {
    let row = sqlx::query(
        "SELECT user_id, bio, specialties, hourly_rate_minor, rating, total_reviews \
         FROM teacher_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| TeacherProfile {
        user_id: row.get("user_id"),
        bio: row.get("bio"),
        specialties: row.get("specialties"),
        hourly_rate_minor: row.get("hourly_rate_minor"),
        rating: row.get("rating"),
        total_reviews: row.get("total_reviews"),
    }))
}

/// Returns the id of any PENDING/CONFIRMED booking for the teacher whose
/// scheduled start falls inside `[window_start, window_end]`, bounds
/// inclusive. Callers pass the padded window.
#[instrument(skip_all)]
pub async fn find_conflicting_booking(
    pool: &Pool,
    teacher_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Option<String>> {
    let id = sqlx::query_scalar::<_, String>(
        "SELECT id FROM bookings WHERE teacher_id = ? \
         AND status IN ('PENDING', 'CONFIRMED') \
         AND datetime(scheduled_start) >= datetime(?) \
         AND datetime(scheduled_start) <= datetime(?) \
         LIMIT 1",
    )
    .bind(teacher_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn insert_booking(pool: &Pool, booking: &Booking) -> Result<()> {
    sqlx::query(
        "INSERT INTO bookings (id, student_id, teacher_id, scheduled_start, duration_minutes, \
         price_minor, notes, status, checkout_ref, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&booking.id)
    .bind(&booking.student_id)
    .bind(&booking.teacher_id)
    .bind(booking.scheduled_start)
    .bind(booking.duration_minutes)
    .bind(booking.price_minor)
    .bind(&booking.notes)
    .bind(booking.status.as_str())
    .bind(&booking.checkout_ref)
    .bind(booking.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_booking_checkout_ref(pool: &Pool, id: &str, checkout_ref: &str) -> Result<()> {
    sqlx::query("UPDATE bookings SET checkout_ref = ? WHERE id = ?")
        .bind(checkout_ref)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Compensating action for a failed checkout-session setup. The only place a
/// booking row is ever hard-deleted.
#[instrument(skip_all)]
pub async fn delete_booking(pool: &Pool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_booking(pool: &Pool, id: &str) -> Result<Option<Booking>> {
    let row = sqlx::query(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(booking_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_booking_by_checkout_ref(
    pool: &Pool,
    checkout_ref: &str,
) -> Result<Option<Booking>> {
    let row = sqlx::query(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE checkout_ref = ?"
    ))
    .bind(checkout_ref)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(booking_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_bookings(pool: &Pool, filter: &BookingFilter) -> Result<Vec<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1=1");
    if filter.teacher_id.is_some() {
        sql.push_str(" AND teacher_id = ?");
    }
    if filter.student_id.is_some() {
        sql.push_str(" AND student_id = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY datetime(scheduled_start) DESC");

    let mut query = sqlx::query(&sql);
    if let Some(teacher_id) = &filter.teacher_id {
        query = query.bind(teacher_id);
    }
    if let Some(student_id) = &filter.student_id {
        query = query.bind(student_id);
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(booking_from_row).collect()
}

/// Applies a payment-success event in one atomic unit: transitions the
/// booking (idempotent) and appends a COMPLETED payment row. The append
/// happens per event received, even when the status transition is a no-op —
/// retried deliveries accumulate payment history by design.
///
/// Returns the booking's status after the event, or `None` when no such
/// booking exists.
#[instrument(skip_all)]
pub async fn record_payment_success(
    pool: &Pool,
    booking_id: &str,
    amount_minor: i64,
    payment_ref: Option<&str>,
    checkout_ref: Option<&str>,
) -> Result<Option<BookingStatus>> {
    let mut tx = pool.begin().await?;
    let status_str =
        sqlx::query_scalar::<_, String>("SELECT status FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(status_str) = status_str else {
        return Ok(None);
    };
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("booking has unknown status {status_str}")))?;

    let final_status = match status.apply(BookingEvent::PaymentSucceeded) {
        Transition::Apply(next) => {
            sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(booking_id)
                .execute(&mut *tx)
                .await?;
            next
        }
        Transition::Noop => status,
    };

    sqlx::query(
        "INSERT INTO payments (booking_id, amount_minor, status, payment_ref, checkout_ref) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(booking_id)
    .bind(amount_minor)
    .bind(PaymentStatus::Completed.as_str())
    .bind(payment_ref)
    .bind(checkout_ref)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(final_status))
}

/// Cancels a booking in response to a checkout-expired event. No payment row
/// is recorded for expiry. Returns true when the transition applied.
#[instrument(skip_all)]
pub async fn cancel_booking_expired(pool: &Pool, booking_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let status_str =
        sqlx::query_scalar::<_, String>("SELECT status FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(status_str) = status_str else {
        return Ok(false);
    };
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("booking has unknown status {status_str}")))?;

    match status.apply(BookingEvent::CheckoutExpired) {
        Transition::Apply(next) => {
            sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(booking_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(true)
        }
        Transition::Noop => Ok(false),
    }
}

/// Applies a payment-failure event: the cancellation transition and the
/// FAILED payment row commit together, or not at all. When the transition is
/// a no-op (booking already CONFIRMED or terminal) nothing is written.
/// Returns true when the transition applied.
#[instrument(skip_all)]
pub async fn record_payment_failure(
    pool: &Pool,
    booking_id: &str,
    amount_minor: i64,
    payment_ref: Option<&str>,
    checkout_ref: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let status_str =
        sqlx::query_scalar::<_, String>("SELECT status FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(status_str) = status_str else {
        return Ok(false);
    };
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("booking has unknown status {status_str}")))?;

    match status.apply(BookingEvent::PaymentFailed) {
        Transition::Apply(next) => {
            sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(booking_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO payments (booking_id, amount_minor, status, payment_ref, checkout_ref) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(booking_id)
            .bind(amount_minor)
            .bind(PaymentStatus::Failed.as_str())
            .bind(payment_ref)
            .bind(checkout_ref)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(true)
        }
        Transition::Noop => Ok(false),
    }
}

/// CONFIRMED -> COMPLETED, driven externally once the lesson time has
/// elapsed. Idempotent like every other transition.
#[instrument(skip_all)]
pub async fn complete_booking(pool: &Pool, booking_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let status_str =
        sqlx::query_scalar::<_, String>("SELECT status FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(status_str) = status_str else {
        return Err(Error::NotFound("booking"));
    };
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("booking has unknown status {status_str}")))?;

    match status.apply(BookingEvent::LessonCompleted) {
        Transition::Apply(next) => {
            sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(booking_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(true)
        }
        Transition::Noop => Ok(false),
    }
}

#[instrument(skip_all)]
pub async fn list_payments_for_booking(pool: &Pool, booking_id: &str) -> Result<Vec<Payment>> {
    let rows = sqlx::query(
        "SELECT id, booking_id, amount_minor, status, payment_ref, checkout_ref, created_at \
         FROM payments WHERE booking_id = ? ORDER BY id ASC",
    )
    .bind(booking_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| {
            let status_str: String = row.get("status");
            let status = PaymentStatus::parse(&status_str).ok_or_else(|| {
                Error::Internal(format!("payment has unknown status {status_str}"))
            })?;
            Ok(Payment {
                id: row.get("id"),
                booking_id: row.get("booking_id"),
                amount_minor: row.get("amount_minor"),
                status,
                payment_ref: row.get("payment_ref"),
                checkout_ref: row.get("checkout_ref"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

#[instrument(skip_all)]
pub async fn get_review_for_booking(pool: &Pool, booking_id: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM reviews WHERE booking_id = ?")
        .bind(booking_id)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Inserts the review and recomputes the teacher's aggregate from all of the
/// teacher's reviews in the same transaction. Full recomputation keeps the
/// rating·total_reviews invariant exact regardless of history.
#[instrument(skip_all)]
pub async fn insert_review_and_recompute(
    pool: &Pool,
    booking_id: &str,
    student_id: &str,
    teacher_id: &str,
    rating: i64,
    comment: Option<&str>,
) -> Result<Review> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        "INSERT INTO reviews (booking_id, student_id, teacher_id, rating, comment) \
         VALUES (?, ?, ?, ?, ?) RETURNING id, created_at",
    )
    .bind(booking_id)
    .bind(student_id)
    .bind(teacher_id)
    .bind(rating)
    .bind(comment)
    .fetch_one(&mut *tx)
    .await;
    let row = match res {
        Ok(row) => row,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Err(Error::Duplicate),
        Err(e) => return Err(e.into()),
    };
    let id: i64 = row.get("id");
    let created_at: DateTime<Utc> = row.get("created_at");

    let agg = sqlx::query(
        "SELECT AVG(CAST(rating AS REAL)) AS mean, COUNT(*) AS n FROM reviews WHERE teacher_id = ?",
    )
    .bind(teacher_id)
    .fetch_one(&mut *tx)
    .await?;
    let mean: f64 = agg.get("mean");
    let n: i64 = agg.get("n");

    sqlx::query("UPDATE teacher_profiles SET rating = ?, total_reviews = ? WHERE user_id = ?")
        .bind(mean)
        .bind(n)
        .bind(teacher_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Review {
        id,
        booking_id: booking_id.to_string(),
        student_id: student_id.to_string(),
        teacher_id: teacher_id.to_string(),
        rating,
        comment: comment.map(str::to_string),
        created_at,
    })
}

#[instrument(skip_all)]
pub async fn list_reviews(
    pool: &Pool,
    teacher_id: Option<&str>,
    booking_id: Option<&str>,
) -> Result<Vec<Review>> {
    let mut sql = String::from(
        "SELECT id, booking_id, student_id, teacher_id, rating, comment, created_at \
         FROM reviews WHERE 1=1",
    );
    if teacher_id.is_some() {
        sql.push_str(" AND teacher_id = ?");
    }
    if booking_id.is_some() {
        sql.push_str(" AND booking_id = ?");
    }
    sql.push_str(" ORDER BY datetime(created_at) DESC, id DESC");

    let mut query = sqlx::query(&sql);
    if let Some(teacher_id) = teacher_id {
        query = query.bind(teacher_id);
    }
    if let Some(booking_id) = booking_id {
        query = query.bind(booking_id);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| Review {
            id: row.get("id"),
            booking_id: row.get("booking_id"),
            student_id: row.get("student_id"),
            teacher_id: row.get("teacher_id"),
            rating: row.get("rating"),
            comment: row.get("comment"),
            created_at: row.get("created_at"),
        })
        .collect())
}

fn posted_time_from_row(row: &SqliteRow) -> Result<PostedTime> {
    Ok(PostedTime {
        id: row.get("id"),
        teacher_id: row.get("teacher_id"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        modality: modality_from_row(row)?,
        price_minor: row.get("price_minor"),
        description: row.get("description"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        is_available: row.get("is_available"),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn insert_posted_time(pool: &Pool, posted: &PostedTime) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO posted_times (teacher_id, starts_at, ends_at, modality, price_minor, \
         description, contact_phone, contact_email, is_available) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&posted.teacher_id)
    .bind(posted.starts_at)
    .bind(posted.ends_at)
    .bind(posted.modality.as_str())
    .bind(posted.price_minor)
    .bind(&posted.description)
    .bind(&posted.contact_phone)
    .bind(&posted.contact_email)
    .bind(posted.is_available)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

#[instrument(skip_all)]
pub async fn get_posted_time(pool: &Pool, id: i64) -> Result<Option<PostedTime>> {
    let row = sqlx::query(
        "SELECT id, teacher_id, starts_at, ends_at, modality, price_minor, description, \
         contact_phone, contact_email, is_available, created_at FROM posted_times WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(posted_time_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_posted_times(pool: &Pool, filter: &PostedTimeFilter) -> Result<Vec<PostedTime>> {
    let mut sql = String::from(
        "SELECT id, teacher_id, starts_at, ends_at, modality, price_minor, description, \
         contact_phone, contact_email, is_available, created_at FROM posted_times WHERE 1=1",
    );
    if filter.teacher_id.is_some() {
        sql.push_str(" AND teacher_id = ?");
    }
    if filter.modality.is_some() {
        sql.push_str(" AND modality = ?");
    }
    if filter.only_available {
        sql.push_str(" AND is_available = 1");
    }
    sql.push_str(" ORDER BY datetime(starts_at) ASC");

    let mut query = sqlx::query(&sql);
    if let Some(teacher_id) = &filter.teacher_id {
        query = query.bind(teacher_id);
    }
    if let Some(modality) = filter.modality {
        query = query.bind(modality.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(posted_time_from_row).collect()
}

#[instrument(skip_all)]
pub async fn delete_posted_time(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posted_times WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn class_request_from_row(row: &SqliteRow) -> Result<ClassRequest> {
    Ok(ClassRequest {
        id: row.get("id"),
        student_id: row.get("student_id"),
        modality: modality_from_row(row)?,
        preferred_start: row.get("preferred_start"),
        duration_minutes: row.get("duration_minutes"),
        max_price_minor: row.get("max_price_minor"),
        description: row.get("description"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn insert_class_request(pool: &Pool, request: &ClassRequest) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO class_requests (student_id, modality, preferred_start, duration_minutes, \
         max_price_minor, description, contact_phone, contact_email, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&request.student_id)
    .bind(request.modality.as_str())
    .bind(request.preferred_start)
    .bind(request.duration_minutes)
    .bind(request.max_price_minor)
    .bind(&request.description)
    .bind(&request.contact_phone)
    .bind(&request.contact_email)
    .bind(request.is_active)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

#[instrument(skip_all)]
pub async fn get_class_request(pool: &Pool, id: i64) -> Result<Option<ClassRequest>> {
    let row = sqlx::query(
        "SELECT id, student_id, modality, preferred_start, duration_minutes, max_price_minor, \
         description, contact_phone, contact_email, is_active, created_at \
         FROM class_requests WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(class_request_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_class_requests(
    pool: &Pool,
    filter: &ClassRequestFilter,
) -> Result<Vec<ClassRequest>> {
    let mut sql = String::from(
        "SELECT id, student_id, modality, preferred_start, duration_minutes, max_price_minor, \
         description, contact_phone, contact_email, is_active, created_at \
         FROM class_requests WHERE 1=1",
    );
    if filter.student_id.is_some() {
        sql.push_str(" AND student_id = ?");
    }
    if filter.modality.is_some() {
        sql.push_str(" AND modality = ?");
    }
    if filter.only_active {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY datetime(created_at) DESC, id DESC");

    let mut query = sqlx::query(&sql);
    if let Some(student_id) = &filter.student_id {
        query = query.bind(student_id);
    }
    if let Some(modality) = filter.modality {
        query = query.bind(modality.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(class_request_from_row).collect()
}

#[instrument(skip_all)]
pub async fn set_class_request_active(pool: &Pool, id: i64, is_active: bool) -> Result<()> {
    sqlx::query("UPDATE class_requests SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            name: format!("user {id}"),
            email: format!("{id}@example.com"),
            phone: None,
            role,
            created_at: Utc::now(),
        }
    }

    fn sample_booking(id: &str, teacher_id: &str, student_id: &str) -> Booking {
        Booking {
            id: id.to_string(),
            student_id: student_id.to_string(),
            teacher_id: teacher_id.to_string(),
            scheduled_start: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            duration_minutes: 60,
            price_minor: 10_000,
            notes: None,
            status: BookingStatus::Pending,
            checkout_ref: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_user_makes_teacher_profile() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        let profile = get_teacher_profile(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 0);
        assert_eq!(profile.rating, 0.0);

        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        assert!(get_teacher_profile(&pool, "s1").await.unwrap().is_none());

        // Same id again is a duplicate.
        let err = create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate));
    }

    #[tokio::test]
    async fn conflict_window_bounds_are_inclusive() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        insert_booking(&pool, &sample_booking("b1", "t1", "s1"))
            .await
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        // Window upper bound exactly at the booking start still conflicts.
        let hit = find_conflicting_booking(&pool, "t1", start, end)
            .await
            .unwrap();
        assert_eq!(hit.as_deref(), Some("b1"));

        // One second earlier no longer overlaps.
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 9, 59, 59).unwrap();
        let hit = find_conflicting_booking(&pool, "t1", start, end)
            .await
            .unwrap();
        assert!(hit.is_none());

        // Other teachers never conflict.
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
        let hit = find_conflicting_booking(&pool, "t2", start, end)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn cancelled_bookings_do_not_conflict() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        insert_booking(&pool, &sample_booking("b1", "t1", "s1"))
            .await
            .unwrap();
        cancel_booking_expired(&pool, "b1").await.unwrap();

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let hit = find_conflicting_booking(&pool, "t1", start, end)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn payment_success_confirms_and_appends() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        insert_booking(&pool, &sample_booking("b1", "t1", "s1"))
            .await
            .unwrap();

        let status = record_payment_success(&pool, "b1", 10_000, Some("pay_1"), Some("cs_1"))
            .await
            .unwrap();
        assert_eq!(status, Some(BookingStatus::Confirmed));

        // Redelivery: status stays CONFIRMED, payment history grows.
        let status = record_payment_success(&pool, "b1", 10_000, Some("pay_1"), Some("cs_1"))
            .await
            .unwrap();
        assert_eq!(status, Some(BookingStatus::Confirmed));

        let payments = list_payments_for_booking(&pool, "b1").await.unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments
            .iter()
            .all(|p| p.status == PaymentStatus::Completed && p.amount_minor == 10_000));

        // Unknown booking: nothing to act on.
        let status = record_payment_success(&pool, "nope", 1, None, None)
            .await
            .unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn payment_failure_pairs_cancel_with_failed_row() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        insert_booking(&pool, &sample_booking("b1", "t1", "s1"))
            .await
            .unwrap();

        let applied = record_payment_failure(&pool, "b1", 10_000, Some("pay_1"), None)
            .await
            .unwrap();
        assert!(applied);
        let booking = get_booking(&pool, "b1").await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        let payments = list_payments_for_booking(&pool, "b1").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);

        // Redelivery against the terminal state writes nothing further.
        let applied = record_payment_failure(&pool, "b1", 10_000, Some("pay_1"), None)
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(list_payments_for_booking(&pool, "b1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn review_recompute_updates_profile() {
        let pool = setup_pool().await;
        create_user(&pool, &sample_user("t1", Role::Teacher))
            .await
            .unwrap();
        create_user(&pool, &sample_user("s1", Role::Student))
            .await
            .unwrap();
        for (bid, rating) in [("b1", 5), ("b2", 4)] {
            let mut b = sample_booking(bid, "t1", "s1");
            b.status = BookingStatus::Completed;
            insert_booking(&pool, &b).await.unwrap();
            insert_review_and_recompute(&pool, bid, "s1", "t1", rating, None)
                .await
                .unwrap();
        }
        let profile = get_teacher_profile(&pool, "t1").await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 2);
        assert!((profile.rating - 4.5).abs() < f64::EPSILON);

        // A second review for the same booking is a duplicate.
        let err = insert_review_and_recompute(&pool, "b1", "s1", "t1", 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate));
    }
}
