use super::*;
use crate::services::mail::test_support::RecordingMailer;
use crate::state::test_helpers::test_config;
use time::macros::{date, datetime};

const TODAY: Date = date!(2025 - 03 - 10);
const NOW: OffsetDateTime = datetime!(2025 - 03 - 10 12:00 UTC);

fn slip(event_date: Option<Date>) -> PermissionSlip {
    PermissionSlip {
        id: Uuid::new_v4(),
        booking_id: Uuid::new_v4(),
        booking_reference: Some("SPK-LIN-20250301-0042".into()),
        school_id: Uuid::new_v4(),
        school_name: "Lincoln Elementary".into(),
        program_title: "Science Museum Adventure".into(),
        event_date,
        event_time: Some("09:30".into()),
        student_id: Uuid::new_v4(),
        student_first_name: "Emma".into(),
        student_last_name: "Johnson".into(),
        parent_name: "Lisa Johnson".into(),
        parent_email: "lisa@example.org".into(),
        parent_phone: None,
        access_token: "a".repeat(64),
        signed_at: None,
        signer_ip: None,
        photo_permission: false,
        emergency_contacts: serde_json::json!([]),
        medical_info: None,
        special_instructions: None,
        reminder_count: 0,
        last_reminder_at: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn sign_input() -> SignSlip {
    SignSlip {
        parent_name: "Lisa Johnson".into(),
        parent_email: "Lisa@Example.org".into(),
        parent_phone: Some("555-0100".into()),
        signature: "data:image/png;base64,iVBORw0KGgo=".into(),
        photo_permission: true,
        emergency_contacts: vec![EmergencyContact {
            name: "Tom Johnson".into(),
            phone: "555-0101".into(),
            relationship: Some("Father".into()),
        }],
        medical_info: None,
        special_instructions: None,
    }
}

// =============================================================================
// overdue and reminders
// =============================================================================

#[test]
fn overdue_window_is_three_days_and_includes_past_events() {
    assert!(slip(Some(date!(2025 - 03 - 13))).is_overdue(TODAY));
    assert!(!slip(Some(date!(2025 - 03 - 14))).is_overdue(TODAY));
    assert!(slip(Some(date!(2025 - 03 - 01))).is_overdue(TODAY));
    assert!(!slip(None).is_overdue(TODAY));
}

#[test]
fn signed_slip_is_never_overdue() {
    let mut s = slip(Some(TODAY));
    s.signed_at = Some(NOW);
    assert!(!s.is_overdue(TODAY));
}

#[test]
fn reminders_are_capped_at_three() {
    let mut s = slip(Some(TODAY));
    s.reminder_count = 2;
    assert!(s.check_reminder_allowed(NOW).is_ok());
    s.reminder_count = 3;
    assert_eq!(s.check_reminder_allowed(NOW), Err("Maximum number of reminders already sent"));
}

#[test]
fn reminders_need_a_day_between_them() {
    let mut s = slip(Some(TODAY));
    s.last_reminder_at = Some(NOW - Duration::hours(23));
    assert_eq!(s.check_reminder_allowed(NOW), Err("A reminder was sent less than 24 hours ago"));
    s.last_reminder_at = Some(NOW - Duration::hours(24));
    assert!(s.check_reminder_allowed(NOW).is_ok());
}

#[test]
fn signed_slips_get_no_reminders() {
    let mut s = slip(Some(TODAY));
    s.signed_at = Some(NOW);
    assert_eq!(s.check_reminder_allowed(NOW), Err("Permission slip is already signed"));
}

#[test]
fn days_until_wording() {
    assert_eq!(days_until_text(Some(date!(2025 - 03 - 15)), TODAY), "in 5 days");
    assert_eq!(days_until_text(Some(date!(2025 - 03 - 11)), TODAY), "in 1 day");
    assert_eq!(days_until_text(Some(TODAY), TODAY), "today");
    assert_eq!(days_until_text(Some(date!(2025 - 03 - 09)), TODAY), "(event has passed)");
}

#[test]
fn status_tab_parsing() {
    assert_eq!(SlipStatus::parse(Some("signed")), Some(SlipStatus::Signed));
    assert_eq!(SlipStatus::parse(Some("overdue")), Some(SlipStatus::Overdue));
    assert_eq!(SlipStatus::parse(Some("all")), None);
    assert_eq!(SlipStatus::parse(Some("bogus")), None);
    assert_eq!(SlipStatus::parse(None), None);
}

// =============================================================================
// statistics
// =============================================================================

#[test]
fn statistics_round_to_two_decimals() {
    let stats = statistics(3, 1, 1);
    assert_eq!(stats.unsigned, 2);
    assert!((stats.completion_rate - 33.33).abs() < f64::EPSILON);
    assert!((stats.overdue_rate - 33.33).abs() < f64::EPSILON);
}

#[test]
fn empty_statistics_are_zero() {
    let stats = statistics(0, 0, 0);
    assert!(stats.completion_rate.abs() < f64::EPSILON);
    assert!(stats.overdue_rate.abs() < f64::EPSILON);
}

#[test]
fn rate_for_full_completion() {
    assert!((rate(20, 20) - 100.0).abs() < f64::EPSILON);
    assert!((rate(2, 3) - 66.67).abs() < f64::EPSILON);
}

// =============================================================================
// signing input
// =============================================================================

#[test]
fn valid_signature_passes() {
    assert!(sign_input().validate().is_ok());
}

#[test]
fn signature_and_contacts_are_checked() {
    let mut input = sign_input();
    input.signature = String::new();
    input.parent_email = "not-an-email".into();
    input.emergency_contacts.push(EmergencyContact { name: " ".into(), phone: String::new(), relationship: None });
    let errors = input.validate().unwrap_err();
    assert!(errors.get("signature").is_some());
    assert!(errors.get("parent_email").is_some());
    assert!(errors.get("emergency_contacts.1.name").is_some());
    assert!(errors.get("emergency_contacts.1.phone").is_some());
    assert!(errors.get("emergency_contacts.0.name").is_none());
}

#[test]
fn sign_input_defaults_optional_fields() {
    let input: SignSlip = serde_json::from_value(serde_json::json!({
        "parent_name": "Lisa Johnson",
        "parent_email": "lisa@example.org",
        "signature": "Lisa Johnson",
    }))
    .unwrap();
    assert!(!input.photo_permission);
    assert!(input.emergency_contacts.is_empty());
}

// =============================================================================
// views and email
// =============================================================================

#[test]
fn view_hides_token_but_staff_view_links_it() {
    let config = test_config();
    let s = slip(Some(date!(2025 - 04 - 01)));
    let token = s.access_token.clone();

    let public = serde_json::to_value(s.clone().view(NOW, None)).unwrap();
    assert!(public.get("access_token").is_none());
    assert!(public.get("signing_url").is_none());
    assert_eq!(public["student_name"], "Emma Johnson");
    assert_eq!(public["is_signed"], false);
    assert_eq!(public["event_date"], "2025-04-01");

    let staff = serde_json::to_value(staff_view(s, &config)).unwrap();
    assert_eq!(staff["signing_url"], format!("https://spark.example.org/permission-slip/{token}"));
}

#[test]
fn signing_request_names_student_and_link() {
    let s = slip(Some(date!(2025 - 04 - 01)));
    let (subject, lines) = slip_email_content(&s, SlipEmail::SigningRequest, "https://x/permission-slip/t", TODAY);
    assert_eq!(subject, "Permission Slip Required - Science Museum Adventure");
    assert!(lines[1].contains("Emma Johnson"));
    assert!(lines[1].contains("2025-04-01"));
    assert!(lines[2].ends_with("https://x/permission-slip/t"));
}

#[test]
fn reminder_counts_days() {
    let s = slip(Some(date!(2025 - 03 - 12)));
    let (subject, lines) = slip_email_content(&s, SlipEmail::Reminder, "u", TODAY);
    assert!(subject.starts_with("Reminder: "));
    assert!(lines[1].contains("in 2 days"));
}

#[tokio::test]
async fn signed_confirmation_goes_to_parent() {
    let mailer = RecordingMailer::default();
    let s = slip(Some(date!(2025 - 04 - 01)));
    assert!(send_slip_email(&mailer, &test_config(), &s, SlipEmail::SignedConfirmation).await);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent[0].to, "lisa@example.org");
    assert_eq!(sent[0].subject, "Permission Slip Signed - Science Museum Adventure");
}

#[tokio::test]
async fn failed_delivery_reports_false() {
    let mailer = RecordingMailer { fail_for: Some("lisa@example.org".into()), ..Default::default() };
    let s = slip(Some(TODAY));
    assert!(!send_slip_email(&mailer, &test_config(), &s, SlipEmail::Reminder).await);
    assert!(mailer.sent.lock().unwrap().is_empty());
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::services::booking;
    use crate::services::live_support::{self, pool};

    fn signature(email: &str) -> SignSlip {
        SignSlip {
            parent_name: "Pat Rivera".into(),
            parent_email: email.into(),
            parent_phone: None,
            signature: "data:image/png;base64,AAAA".into(),
            photo_permission: true,
            emergency_contacts: Vec::new(),
            medical_info: None,
            special_instructions: None,
        }
    }

    #[tokio::test]
    async fn signing_twice_is_rejected() {
        let pool = pool().await;
        let (confirmed, _) = live_support::confirmed_booking(&pool, &["Ava"]).await;
        let created = create_slips_for_booking(&pool, confirmed.id).await.unwrap();
        assert_eq!(created.len(), 1);
        let token = &created[0].access_token;

        let signed = sign_slip(&pool, token, &signature("pat@example.org"), Some("203.0.113.9"))
            .await
            .unwrap();
        assert!(signed.is_signed());
        assert_eq!(signed.signer_ip.as_deref(), Some("203.0.113.9"));

        let again = sign_slip(&pool, token, &signature("pat@example.org"), None).await;
        assert!(matches!(again, Err(SlipError::AlreadySigned)));
        assert!(matches!(delete_slip(&pool, signed.id).await, Err(SlipError::SignedSlipLocked)));

        let stats = booking::booking_statistics(&pool, confirmed.id).await.unwrap();
        assert_eq!(stats.permission_slips_signed, 1);
        assert!(stats.all_permission_slips_signed);
    }

    #[tokio::test]
    async fn reminders_are_counted_only_when_delivered() {
        let pool = pool().await;
        let config = test_config();
        let (confirmed, _) = live_support::confirmed_booking(&pool, &["Ava", "Ben"]).await;
        let created = create_slips_for_booking(&pool, confirmed.id).await.unwrap();
        let (failing, working) = (&created[0], &created[1]);
        let mailer = RecordingMailer { fail_for: Some(failing.parent_email.clone()), ..Default::default() };

        let outcome = send_reminder(&pool, &mailer, &config, failing.id).await.unwrap();
        assert!(!outcome.delivered);
        assert_eq!(outcome.slip.slip.reminder_count, 0);
        assert!(outcome.slip.slip.last_reminder_at.is_none());

        let outcome = send_reminder(&pool, &mailer, &config, working.id).await.unwrap();
        assert!(outcome.delivered);
        assert_eq!(outcome.slip.slip.reminder_count, 1);
        assert!(outcome.slip.slip.last_reminder_at.is_some());

        let throttled = send_reminder(&pool, &mailer, &config, working.id).await;
        assert!(matches!(throttled, Err(SlipError::ReminderNotAllowed(_))));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        let bulk = send_bulk_reminders(&pool, &mailer, &config, &[failing.id, working.id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(bulk.sent, 0);
        assert_eq!(bulk.failed, 1);
        assert_eq!(bulk.skipped, 2);
        assert_eq!(get_slip(&pool, failing.id).await.unwrap().reminder_count, 0);
    }

    #[tokio::test]
    async fn concurrent_reminders_claim_a_single_slot() {
        let pool = pool().await;
        let config = test_config();
        let (confirmed, _) = live_support::confirmed_booking(&pool, &["Ava"]).await;
        let slip = create_slips_for_booking(&pool, confirmed.id).await.unwrap().remove(0);
        let mailer = RecordingMailer::default();

        let (first, second) = tokio::join!(
            send_reminder(&pool, &mailer, &config, slip.id),
            send_reminder(&pool, &mailer, &config, slip.id),
        );
        let delivered = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Ok(outcome) if outcome.delivered))
            .count();
        let refused = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(SlipError::ReminderNotAllowed(_))))
            .count();
        assert_eq!((delivered, refused), (1, 1));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        assert_eq!(get_slip(&pool, slip.id).await.unwrap().reminder_count, 1);
    }
}
