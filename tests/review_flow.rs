use chrono::{TimeZone, Utc};
use zenbook::db;
use zenbook::error::Error;
use zenbook::model::{Booking, BookingStatus, Caller, Role, User};
use zenbook::review::{self, NewReview};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn seed_user(pool: &sqlx::SqlitePool, id: &str, role: Role) {
    let user = User {
        id: id.to_string(),
        name: format!("user {id}"),
        email: format!("{id}@example.com"),
        phone: None,
        role,
        created_at: Utc::now(),
    };
    db::create_user(pool, &user).await.unwrap();
}

async fn seed_booking(
    pool: &sqlx::SqlitePool,
    id: &str,
    teacher_id: &str,
    student_id: &str,
    status: BookingStatus,
) {
    let booking = Booking {
        id: id.to_string(),
        student_id: student_id.to_string(),
        teacher_id: teacher_id.to_string(),
        scheduled_start: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        duration_minutes: 60,
        price_minor: 10_000,
        notes: None,
        status,
        checkout_ref: None,
        created_at: Utc::now(),
    };
    db::insert_booking(pool, &booking).await.unwrap();
}

fn student(id: &str) -> Caller {
    Caller {
        id: id.to_string(),
        role: Role::Student,
    }
}

fn review_input(booking_id: &str, rating: i64) -> NewReview {
    NewReview {
        booking_id: booking_id.to_string(),
        rating,
        comment: None,
    }
}

#[tokio::test]
async fn preconditions_are_checked_in_order() {
    let pool = setup_pool().await;
    seed_user(&pool, "t1", Role::Teacher).await;
    seed_user(&pool, "s1", Role::Student).await;
    seed_user(&pool, "s2", Role::Student).await;
    seed_booking(&pool, "b1", "t1", "s1", BookingStatus::Pending).await;

    let teacher_caller = Caller {
        id: "t1".into(),
        role: Role::Teacher,
    };
    let err = review::record_review(&pool, &teacher_caller, review_input("b1", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));

    for rating in [0, 6] {
        let err = review::record_review(&pool, &student("s1"), review_input("b1", rating))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "rating={rating}");
    }

    let err = review::record_review(&pool, &student("s1"), review_input("missing", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound("booking")));

    let err = review::record_review(&pool, &student("s2"), review_input("b1", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));

    // Still the caller's booking, but the lesson has not happened yet.
    let err = review::record_review(&pool, &student("s1"), review_input("b1", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState("PENDING")));
}

#[tokio::test]
async fn completed_lesson_is_reviewed_exactly_once() {
    let pool = setup_pool().await;
    seed_user(&pool, "t1", Role::Teacher).await;
    seed_user(&pool, "s1", Role::Student).await;
    seed_booking(&pool, "b1", "t1", "s1", BookingStatus::Completed).await;

    let mut input = review_input("b1", 5);
    input.comment = Some("great class".into());
    let review = review::record_review(&pool, &student("s1"), input)
        .await
        .unwrap();
    assert_eq!(review.rating, 5);
    assert_eq!(review.comment.as_deref(), Some("great class"));

    let err = review::record_review(&pool, &student("s1"), review_input("b1", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate));

    // The failed duplicate must not have touched the aggregate.
    let profile = db::get_teacher_profile(&pool, "t1").await.unwrap().unwrap();
    assert_eq!(profile.total_reviews, 1);
    assert!((profile.rating - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn aggregate_is_the_exact_mean_regardless_of_order() {
    let pool = setup_pool().await;
    seed_user(&pool, "t1", Role::Teacher).await;
    seed_user(&pool, "t2", Role::Teacher).await;
    seed_user(&pool, "s1", Role::Student).await;

    // Same ratings, opposite insertion orders, one teacher each.
    let forward = [("f1", 5), ("f2", 3), ("f3", 4)];
    let backward = [("r1", 4), ("r2", 3), ("r3", 5)];
    for (bid, rating) in forward {
        seed_booking(&pool, bid, "t1", "s1", BookingStatus::Completed).await;
        review::record_review(&pool, &student("s1"), review_input(bid, rating))
            .await
            .unwrap();
    }
    for (bid, rating) in backward {
        seed_booking(&pool, bid, "t2", "s1", BookingStatus::Completed).await;
        review::record_review(&pool, &student("s1"), review_input(bid, rating))
            .await
            .unwrap();
    }

    for teacher_id in ["t1", "t2"] {
        let profile = db::get_teacher_profile(&pool, teacher_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.total_reviews, 3);
        assert!((profile.rating - 4.0).abs() < 1e-9, "teacher={teacher_id}");
    }
}

#[tokio::test]
async fn listing_requires_a_filter() {
    let pool = setup_pool().await;
    seed_user(&pool, "t1", Role::Teacher).await;
    seed_user(&pool, "s1", Role::Student).await;
    seed_booking(&pool, "b1", "t1", "s1", BookingStatus::Completed).await;
    review::record_review(&pool, &student("s1"), review_input("b1", 4))
        .await
        .unwrap();

    let err = review::list_reviews(&pool, None, None).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let by_teacher = review::list_reviews(&pool, Some("t1"), None).await.unwrap();
    assert_eq!(by_teacher.len(), 1);
    assert_eq!(by_teacher[0].booking_id, "b1");

    let by_booking = review::list_reviews(&pool, None, Some("b1")).await.unwrap();
    assert_eq!(by_booking.len(), 1);

    let none = review::list_reviews(&pool, Some("t9"), None).await.unwrap();
    assert!(none.is_empty());
}
