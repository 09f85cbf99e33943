//! Fixtures for `live-db-tests`. Every call inserts fresh rows with unique
//! emails and codes, so tests can share one database and run in parallel.

use sqlx::PgPool;
use uuid::Uuid;

use crate::services::booking::{self, Booking, BookingStudent, ConfirmBooking, NewBooking, NewStudent};
use crate::validation;

pub async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
    crate::db::init_pool(&url).await.expect("pool")
}

fn unique() -> String {
    Uuid::new_v4().simple().to_string()
}

pub async fn insert_user(pool: &PgPool, role: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO users (email, name, role) VALUES ($1, $2, $3) RETURNING id")
        .bind(format!("{role}-{}@example.org", unique()))
        .bind(format!("Test {role}"))
        .bind(role)
        .fetch_one(pool)
        .await
        .expect("insert user")
}

pub async fn insert_school(pool: &PgPool) -> (Uuid, String) {
    let code = format!("T{}", &unique()[..9]).to_uppercase();
    let id = sqlx::query_scalar("INSERT INTO schools (name, code) VALUES ('Lincoln Elementary', $1) RETURNING id")
        .bind(&code)
        .fetch_one(pool)
        .await
        .expect("insert school");
    (id, code)
}

pub async fn insert_program(pool: &PgPool, max_students: i32) -> Uuid {
    sqlx::query_scalar(
        r"INSERT INTO programs (title, category, grade_levels, duration_minutes, max_students, price_per_student_cents)
          VALUES ('Science Museum Adventure', 'science', '{3,4}', 120, $1, 1500)
          RETURNING id",
    )
    .bind(max_students)
    .fetch_one(pool)
    .await
    .expect("insert program")
}

pub fn new_booking(school_id: Uuid, program_id: Uuid, student_count: i32) -> NewBooking {
    NewBooking {
        school_id,
        program_id,
        student_count,
        preferred_date: None,
        preferred_time: None,
        special_requests: None,
        contact_info: None,
    }
}

pub fn student(first_name: &str, parent_email: &str) -> NewStudent {
    NewStudent {
        first_name: first_name.into(),
        last_name: "Rivera".into(),
        grade: Some("4".into()),
        parent_name: "Pat Rivera".into(),
        parent_email: parent_email.into(),
        parent_phone: None,
        medical_info: None,
        special_needs: None,
    }
}

/// A pending booking for `student_count` students at a fresh school and program.
pub async fn pending_booking(pool: &PgPool, student_count: i32) -> Booking {
    let teacher = insert_user(pool, "teacher").await;
    let (school_id, _) = insert_school(pool).await;
    let program_id = insert_program(pool, 30).await;
    booking::create_booking(pool, teacher, &new_booking(school_id, program_id, student_count))
        .await
        .expect("create booking")
}

/// A booking confirmed for today, with a roster of `names`.
pub async fn confirmed_booking(pool: &PgPool, names: &[&str]) -> (Booking, Vec<BookingStudent>) {
    let count = i32::try_from(names.len()).expect("roster size");
    let pending = pending_booking(pool, count).await;
    let students: Vec<NewStudent> = names
        .iter()
        .map(|name| student(name, &format!("{}-{}@example.org", name.to_ascii_lowercase(), unique())))
        .collect();
    let added = booking::add_students(pool, pending.id, &students).await.expect("add students");
    let confirm = ConfirmBooking { date: validation::today().to_string(), time: "09:30".into(), notes: None };
    let confirmed = booking::confirm_booking(pool, pending.id, &confirm).await.expect("confirm booking");
    (confirmed, added.students)
}
