use super::*;
use crate::services::mail::test_support::RecordingMailer;
use time::macros::date;

fn booking(status: BookingStatus, confirmed_date: Option<Date>) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        reference: Some("SPK-LIN-20250301-0042".into()),
        school_id: Uuid::new_v4(),
        school_name: "Lincoln Elementary".into(),
        school_code: "LIN".into(),
        program_id: Uuid::new_v4(),
        program_title: "Science Museum Adventure".into(),
        teacher_id: Uuid::new_v4(),
        teacher_name: "Sarah Johnson".into(),
        teacher_email: "sarah@lincoln.example.org".into(),
        student_count: 25,
        total_cost_cents: 37_500,
        status,
        payment_status: "pending".into(),
        preferred_date: None,
        preferred_time: None,
        confirmed_date,
        confirmed_time: confirmed_date.map(|_| "09:30".to_owned()),
        payment_due_date: None,
        special_requests: None,
        contact_info: serde_json::json!({}),
        notes: None,
        rating: None,
        feedback: None,
        confirmed_at: None,
        cancelled_at: None,
        completed_at: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

const TODAY: Date = date!(2025 - 03 - 10);

// =============================================================================
// reference, cost, capacity
// =============================================================================

#[test]
fn reference_uses_school_prefix_date_and_padded_sequence() {
    assert_eq!(booking_reference("LINCOLN", date!(2025 - 03 - 01), 42), "SPK-LIN-20250301-0042");
    assert_eq!(booking_reference("ab", date!(2025 - 12 - 31), 7), "SPK-AB-20251231-0007");
    assert_eq!(booking_reference("WHS", date!(2026 - 01 - 05), 12_345), "SPK-WHS-20260105-12345");
}

#[test]
fn total_cost_is_count_times_price() {
    assert_eq!(total_cost_cents(25, 1500), 37_500);
    assert_eq!(total_cost_cents(0, 1500), 0);
    assert_eq!(total_cost_cents(10, 0), 0);
}

#[test]
fn capacity_allows_exact_fit() {
    assert!(check_capacity(30, 30).is_ok());
    let err = check_capacity(31, 30).unwrap_err();
    assert!(matches!(err, BookingError::CapacityExceeded(30)));
    assert_eq!(err.to_string(), "Student count exceeds program capacity of 30");
}

#[test]
fn payment_is_due_in_seven_days() {
    assert_eq!(payment_due_date(TODAY), date!(2025 - 03 - 17));
}

#[test]
fn check_in_codes_use_unambiguous_alphabet() {
    let code = generate_check_in_code();
    assert_eq!(code.len(), CHECK_IN_CODE_LEN);
    assert!(code.bytes().all(|b| CHECK_IN_ALPHABET.contains(&b)));
    assert_ne!(generate_check_in_code(), generate_check_in_code());
}

// =============================================================================
// lifecycle rules
// =============================================================================

#[test]
fn only_pending_can_be_confirmed() {
    assert!(booking(BookingStatus::Pending, None).ensure_confirmable().is_ok());
    for status in [BookingStatus::Confirmed, BookingStatus::Cancelled, BookingStatus::Completed] {
        let err = booking(status, None).ensure_confirmable().unwrap_err();
        assert_eq!(err.to_string(), "Only pending bookings can be confirmed");
    }
}

#[test]
fn pending_without_date_can_be_cancelled() {
    assert!(booking(BookingStatus::Pending, None).ensure_cancellable(TODAY).is_ok());
}

#[test]
fn cancellation_needs_a_full_day_of_notice() {
    assert!(booking(BookingStatus::Confirmed, Some(date!(2025 - 03 - 11))).ensure_cancellable(TODAY).is_ok());
    assert!(!booking(BookingStatus::Confirmed, Some(TODAY)).ensure_cancellable(TODAY).is_ok());
    assert!(!booking(BookingStatus::Confirmed, Some(date!(2025 - 03 - 01))).ensure_cancellable(TODAY).is_ok());
}

#[test]
fn closed_bookings_cannot_be_cancelled() {
    for status in [BookingStatus::Cancelled, BookingStatus::Completed] {
        assert!(!booking(status, None).ensure_cancellable(TODAY).is_ok());
    }
}

#[test]
fn completion_requires_confirmed_and_arrived() {
    assert!(booking(BookingStatus::Confirmed, Some(TODAY)).ensure_completable(TODAY).is_ok());
    assert!(booking(BookingStatus::Confirmed, Some(date!(2025 - 03 - 01))).ensure_completable(TODAY).is_ok());

    let early = booking(BookingStatus::Confirmed, Some(date!(2025 - 03 - 11))).ensure_completable(TODAY);
    assert_eq!(early.unwrap_err().to_string(), "Bookings cannot be completed before the program date");

    let pending = booking(BookingStatus::Pending, None).ensure_completable(TODAY);
    assert!(matches!(pending, Err(BookingError::InvalidTransition(_))));
}

#[test]
fn student_count_is_frozen_once_confirmed() {
    assert!(booking(BookingStatus::Pending, None).ensure_student_count_editable().is_ok());
    assert!(booking(BookingStatus::Confirmed, Some(TODAY)).ensure_student_count_editable().is_err());
}

#[test]
fn students_cannot_join_closed_bookings() {
    assert!(booking(BookingStatus::Confirmed, Some(TODAY)).ensure_accepts_students().is_ok());
    assert!(booking(BookingStatus::Completed, Some(TODAY)).ensure_accepts_students().is_err());
    assert!(booking(BookingStatus::Cancelled, None).ensure_accepts_students().is_err());
}

#[test]
fn cancellation_notes_append_reason() {
    assert_eq!(cancellation_notes(None, Some("Bus unavailable")), "Cancelled: Bus unavailable");
    assert_eq!(cancellation_notes(None, None), "Cancelled: No reason provided");
    assert_eq!(cancellation_notes(None, Some("  ")), "Cancelled: No reason provided");
    assert_eq!(
        cancellation_notes(Some("Bring lunches"), Some("Weather")),
        "Bring lunches\nCancelled: Weather"
    );
}

#[test]
fn status_names_round_trip() {
    for status in [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Completed,
    ] {
        assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(BookingStatus::parse("archived"), None);
}

// =============================================================================
// inputs
// =============================================================================

fn new_booking() -> NewBooking {
    NewBooking {
        school_id: Uuid::new_v4(),
        program_id: Uuid::new_v4(),
        student_count: 25,
        preferred_date: Some("2025-04-01".into()),
        preferred_time: Some("09:30".into()),
        special_requests: None,
        contact_info: Some(serde_json::json!({"primary_contact_email": "office@lincoln.example.org"})),
    }
}

#[test]
fn new_booking_parses_preferred_date() {
    assert_eq!(new_booking().validate(TODAY).unwrap(), Some(date!(2025 - 04 - 01)));
}

#[test]
fn new_booking_rejects_bad_fields() {
    let mut input = new_booking();
    input.student_count = 0;
    input.preferred_date = Some("2025-03-01".into());
    input.preferred_time = Some("25:00".into());
    input.contact_info = Some(serde_json::json!({"primary_contact_email": "nope"}));
    let errors = input.validate(TODAY).unwrap_err();
    assert!(errors.get("student_count").is_some());
    assert!(errors.get("preferred_date").is_some());
    assert!(errors.get("preferred_time").is_some());
    assert!(errors.get("contact_info.primary_contact_email").is_some());
}

#[test]
fn confirm_input_requires_date_and_time() {
    let ok = ConfirmBooking { date: "2025-04-01".into(), time: "10:00".into(), notes: None };
    assert_eq!(ok.validate().unwrap(), date!(2025 - 04 - 01));

    let bad = ConfirmBooking { date: "April 1".into(), time: "ten".into(), notes: None };
    let errors = bad.validate().unwrap_err();
    assert!(errors.get("date").is_some());
    assert!(errors.get("time").is_some());
}

#[test]
fn rating_must_be_one_to_five() {
    for rating in 1..=5 {
        assert!(CompleteBooking { rating: Some(rating), feedback: None }.validate().is_ok());
    }
    for rating in [0, 6] {
        assert!(CompleteBooking { rating: Some(rating), feedback: None }.validate().is_err());
    }
    assert!(CompleteBooking::default().validate().is_ok());
}

#[test]
fn student_batch_validation_reports_indexed_fields() {
    let students = vec![
        NewStudent {
            first_name: "Emma".into(),
            last_name: "Johnson".into(),
            grade: Some("4".into()),
            parent_name: "Lisa Johnson".into(),
            parent_email: "lisa@example.org".into(),
            parent_phone: None,
            medical_info: None,
            special_needs: None,
        },
        NewStudent {
            first_name: String::new(),
            last_name: "Davis".into(),
            grade: None,
            parent_name: "Mark Davis".into(),
            parent_email: "mark-at-example".into(),
            parent_phone: None,
            medical_info: None,
            special_needs: None,
        },
    ];
    let errors = validate_students(&students).unwrap_err();
    assert!(errors.get("students.1.first_name").is_some());
    assert!(errors.get("students.1.parent_email").is_some());
    assert!(errors.get("students.0.first_name").is_none());

    assert!(validate_students(&[]).unwrap_err().get("students").is_some());
}

// =============================================================================
// statistics and notices
// =============================================================================

#[test]
fn all_slips_signed_when_every_student_signed() {
    let stats = statistics(20, 18, 20);
    assert_eq!(stats.permission_slips_required, 20);
    assert!(stats.all_permission_slips_signed);
    assert!(!statistics(20, 18, 19).all_permission_slips_signed);
}

#[test]
fn students_without_slips_are_not_all_signed() {
    let stats = statistics(10, 0, 0);
    assert_eq!(stats.permission_slips_required, 10);
    assert_eq!(stats.permission_slips_signed, 0);
    assert!(!stats.all_permission_slips_signed);
    assert!(statistics(0, 0, 0).all_permission_slips_signed);
}

#[test]
fn contact_email_prefers_primary_contact() {
    let mut b = booking(BookingStatus::Pending, None);
    assert_eq!(b.contact_email(), "sarah@lincoln.example.org");
    b.contact_info = serde_json::json!({"primary_contact_email": "office@lincoln.example.org"});
    assert_eq!(b.contact_email(), "office@lincoln.example.org");
}

#[test]
fn confirmed_notice_mentions_date_and_payment() {
    let mut b = booking(BookingStatus::Confirmed, Some(date!(2025 - 04 - 01)));
    b.payment_due_date = Some(date!(2025 - 03 - 17));
    let (subject, lines) = notice_content(&b, BookingNotice::Confirmed);
    assert_eq!(subject, "Spark Program Booking Confirmed");
    assert!(lines[0].contains("2025-04-01 at 09:30"));
    assert!(lines[1].contains("2025-03-17"));
}

#[test]
fn booking_serializes_dates_as_iso_strings() {
    let b = booking(BookingStatus::Confirmed, Some(date!(2025 - 04 - 01)));
    let json = serde_json::to_value(&b).unwrap();
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["confirmed_date"], "2025-04-01");
    assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
    assert!(json.get("teacher_email").is_none());
}

#[tokio::test]
async fn cancelled_notice_goes_to_contact() {
    let mailer = RecordingMailer::default();
    let b = booking(BookingStatus::Cancelled, None);
    assert!(send_notice(&mailer, &b, BookingNotice::Cancelled { reason: None }).await);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent[0].to, "sarah@lincoln.example.org");
    assert_eq!(sent[0].subject, "Spark Program Booking Cancelled");
    assert!(sent[0].html.contains("No reason provided"));
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::services::live_support::{self, pool};

    #[tokio::test]
    async fn create_assigns_reference_and_enforces_capacity() {
        let pool = pool().await;
        let teacher = live_support::insert_user(&pool, "teacher").await;
        let (school_id, code) = live_support::insert_school(&pool).await;
        let program_id = live_support::insert_program(&pool, 30).await;

        let created = create_booking(&pool, teacher, &live_support::new_booking(school_id, program_id, 12))
            .await
            .unwrap();
        let today = validation::today();
        let prefix = format!(
            "SPK-{}-{:04}{:02}{:02}-",
            &code[..3],
            today.year(),
            u8::from(today.month()),
            today.day()
        );
        assert!(created.reference.as_deref().unwrap().starts_with(&prefix));
        assert_eq!(created.status, BookingStatus::Pending);
        assert_eq!(created.total_cost_cents, 12 * 1500);

        let over = create_booking(&pool, teacher, &live_support::new_booking(school_id, program_id, 31)).await;
        assert!(matches!(over, Err(BookingError::CapacityExceeded(30))));
    }

    #[tokio::test]
    async fn lifecycle_updates_are_guarded_by_status() {
        let pool = pool().await;
        let booking = live_support::pending_booking(&pool, 10).await;

        let early = complete_booking(&pool, booking.id, &CompleteBooking::default()).await;
        assert!(matches!(early, Err(BookingError::InvalidTransition(_))));

        let confirm = ConfirmBooking { date: validation::today().to_string(), time: "10:00".into(), notes: None };
        let confirmed = confirm_booking(&pool, booking.id, &confirm).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.confirmed_time.as_deref(), Some("10:00"));
        assert!(matches!(
            confirm_booking(&pool, booking.id, &confirm).await,
            Err(BookingError::InvalidTransition(_))
        ));

        let completed = complete_booking(&pool, booking.id, &CompleteBooking { rating: Some(5), feedback: None })
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.rating, Some(5));
        assert!(matches!(
            cancel_booking(&pool, booking.id, None).await,
            Err(BookingError::InvalidTransition(_))
        ));

        let other = live_support::pending_booking(&pool, 5).await;
        let cancelled = cancel_booking(&pool, other.id, Some("Weather")).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Cancelled: Weather"));
        assert!(cancelled.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn statistics_require_a_slip_per_student() {
        let pool = pool().await;
        let (booking, students) = live_support::confirmed_booking(&pool, &["Emma", "Liam", "Noah"]).await;
        assert_eq!(students.len(), 3);

        let stats = booking_statistics(&pool, booking.id).await.unwrap();
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.permission_slips_required, 3);
        assert_eq!(stats.permission_slips_signed, 0);
        assert!(!stats.all_permission_slips_signed);
    }
}
