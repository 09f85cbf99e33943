use super::*;

fn sample_config() -> Config {
    Config {
        database_url: "postgres://localhost/spark".into(),
        port: DEFAULT_PORT,
        app_env: "testing".into(),
        frontend_url: "https://spark.example.org".into(),
        mail: None,
        cookie_secure: true,
        rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
        rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
    }
}

// =============================================================================
// parse_bool
// =============================================================================

#[test]
fn parse_bool_true_variants() {
    for val in ["1", "true", "yes", "on", "TRUE", "On", "  yes  "] {
        assert_eq!(parse_bool(val), Some(true), "expected true for {val:?}");
    }
}

#[test]
fn parse_bool_false_variants() {
    for val in ["0", "false", "no", "off", "False", " OFF "] {
        assert_eq!(parse_bool(val), Some(false), "expected false for {val:?}");
    }
}

#[test]
fn parse_bool_rejects_garbage() {
    assert_eq!(parse_bool("maybe"), None);
    assert_eq!(parse_bool(""), None);
}

// =============================================================================
// env parsing: unique variable names keep parallel tests independent.
// =============================================================================

#[test]
fn env_bool_unset_returns_none() {
    assert_eq!(env_bool("__SPARK_TEST_SURELY_UNSET_BOOL__"), None);
}

#[test]
fn env_parse_strict_uses_default_when_unset() {
    let value: u64 = env_parse_strict("__SPARK_TEST_UNSET_NUM__", 42).unwrap();
    assert_eq!(value, 42);
}

#[test]
fn env_parse_strict_parses_value() {
    let key = "__SPARK_TEST_NUM_OK_311__";
    unsafe { std::env::set_var(key, " 17 ") };
    let value: u64 = env_parse_strict(key, 1).unwrap();
    assert_eq!(value, 17);
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_parse_strict_rejects_garbage() {
    let key = "__SPARK_TEST_NUM_BAD_312__";
    unsafe { std::env::set_var(key, "lots") };
    let result: Result<u64, _> = env_parse_strict(key, 1);
    assert!(matches!(result, Err(ConfigError::Invalid { value, .. }) if value == "lots"));
    unsafe { std::env::remove_var(key) };
}

// =============================================================================
// signing_url
// =============================================================================

#[test]
fn signing_url_appends_token() {
    let config = sample_config();
    assert_eq!(config.signing_url("abc123"), "https://spark.example.org/permission-slip/abc123");
}
