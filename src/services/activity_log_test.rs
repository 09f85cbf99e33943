use super::*;

#[test]
fn redact_masks_sensitive_keys() {
    let payload = serde_json::json!({
        "email": "parent@example.org",
        "signature": "data:image/png;base64,AAAA",
        "code": "ABC234",
    });
    let redacted = redact(&payload);
    assert_eq!(redacted["email"], "parent@example.org");
    assert_eq!(redacted["signature"], REDACTED);
    assert_eq!(redacted["code"], REDACTED);
}

#[test]
fn redact_recurses_into_nested_values() {
    let payload = serde_json::json!({
        "students": [{"first_name": "Emma", "password": "hunter2"}],
        "auth": {"token": "abc"},
    });
    let redacted = redact(&payload);
    assert_eq!(redacted["students"][0]["first_name"], "Emma");
    assert_eq!(redacted["students"][0]["password"], REDACTED);
    assert_eq!(redacted["auth"]["token"], REDACTED);
}

#[test]
fn redact_leaves_scalars_alone() {
    assert_eq!(redact(&Value::from(5)), Value::from(5));
    assert_eq!(redact(&Value::Null), Value::Null);
}
