use super::*;

fn input(name: &str, code: &str) -> NewSchool {
    NewSchool { name: name.into(), code: code.into(), address: None, phone: None, email: None }
}

#[test]
fn school_code_is_uppercased() {
    assert_eq!(normalize_school_code(" lhs "), Some("LHS".to_owned()));
    assert_eq!(normalize_school_code("Lincoln01"), Some("LINCOLN01".to_owned()));
}

#[test]
fn school_code_rejects_bad_shapes() {
    assert_eq!(normalize_school_code("L"), None);
    assert_eq!(normalize_school_code("ABCDEFGHIJK"), None);
    assert_eq!(normalize_school_code("LH-S"), None);
    assert_eq!(normalize_school_code(""), None);
}

#[test]
fn validate_new_school_returns_code() {
    assert_eq!(validate_new_school(&input("Lincoln Elementary", "lin")).unwrap(), "LIN");
}

#[test]
fn validate_new_school_collects_every_field() {
    let mut bad = input("", "x");
    bad.email = Some("not-an-email".into());
    let errors = validate_new_school(&bad).unwrap_err();
    assert!(errors.get("name").is_some());
    assert!(errors.get("code").is_some());
    assert!(errors.get("email").is_some());
}

#[test]
fn school_serializes_rfc3339_timestamp() {
    let school = School {
        id: Uuid::nil(),
        name: "Lincoln Elementary".into(),
        code: "LIN".into(),
        address: None,
        phone: None,
        email: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
    };
    let json = serde_json::to_value(&school).unwrap();
    assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
}
