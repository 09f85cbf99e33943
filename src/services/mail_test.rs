use super::test_support::RecordingMailer;
use super::*;

#[test]
fn escape_html_escapes_markup() {
    assert_eq!(escape_html("<b>Tom & \"Jerry\"</b>"), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    assert_eq!(escape_html("plain"), "plain");
}

#[test]
fn render_notification_escapes_paragraphs() {
    let html = render_notification("Checked in", &["Emma <3 science".to_owned()]);
    assert!(html.contains("<p>Emma &lt;3 science</p>"));
    assert!(html.contains("Checked in"));
    assert!(!html.contains("{{BODY}}"));
}

#[tokio::test]
async fn deliver_reports_success() {
    let mailer = RecordingMailer::default();
    assert!(deliver(&mailer, "test", "a@example.org", "Hi", "<p>x</p>").await);
    assert_eq!(mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deliver_reports_failure_without_error() {
    let mailer = RecordingMailer { fail_for: Some("bad@example.org".into()), ..Default::default() };
    assert!(!deliver(&mailer, "test", "bad@example.org", "Hi", "<p>x</p>").await);
    assert!(mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn log_mailer_accepts_everything() {
    assert!(deliver(&LogMailer, "test", "a@example.org", "Hi", "").await);
}
