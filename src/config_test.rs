use super::*;

// =============================================================================
// env_bool: uses unique env var names to avoid races with parallel tests.
// =============================================================================

#[test]
fn env_bool_true_variants() {
    for (i, val) in ["1", "true", "yes", "on"].iter().enumerate() {
        let key = format!("__SM_EB_TRUE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(true), "expected true for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
}

#[test]
fn env_bool_false_variants() {
    for (i, val) in ["0", "false", "no", "off"].iter().enumerate() {
        let key = format!("__SM_EB_FALSE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(false), "expected false for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
}

#[test]
fn env_bool_case_and_whitespace_insensitive() {
    let key = "__SM_EB_CI_771__";
    unsafe { std::env::set_var(key, "  TRUE ") };
    assert_eq!(env_bool(key), Some(true));
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_bool_invalid_or_unset_returns_none() {
    let key = "__SM_EB_INVALID_772__";
    unsafe { std::env::set_var(key, "maybe") };
    assert_eq!(env_bool(key), None);
    unsafe { std::env::remove_var(key) };
    assert_eq!(env_bool("__SM_EB_SURELY_UNSET_773__"), None);
}

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_reads_value() {
    let key = "__SM_EP_OK_774__";
    unsafe { std::env::set_var(key, " 64 ") };
    assert_eq!(env_parse::<usize>(key, 8), 64);
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_parse_falls_back_on_garbage() {
    let key = "__SM_EP_BAD_775__";
    unsafe { std::env::set_var(key, "lots") };
    assert_eq!(env_parse::<u32>(key, 5), 5);
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_parse_falls_back_when_unset() {
    assert_eq!(env_parse::<u64>("__SM_EP_UNSET_776__", 60), 60);
}

// =============================================================================
// AppConfig
// =============================================================================

#[test]
fn absolute_without_origin_is_relative() {
    let config = test_support::test_config();
    assert_eq!(config.absolute("/dashboard"), "/dashboard");
}

#[test]
fn absolute_with_origin_prefixes_path() {
    let mut config = test_support::test_config();
    config.public_origin = Some("https://marks.example.com".into());
    assert_eq!(config.absolute("/dashboard"), "https://marks.example.com/dashboard");
}

#[test]
fn config_error_display_names_key() {
    assert!(ConfigError::Missing("DATABASE_URL").to_string().contains("DATABASE_URL"));
    let invalid = ConfigError::Invalid { key: "PORT", value: "http".into() };
    assert!(invalid.to_string().contains("PORT"));
    assert!(invalid.to_string().contains("http"));
}
