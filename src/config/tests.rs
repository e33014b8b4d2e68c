use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.namespace, "snapfront");
    assert_eq!(settings.cache.maxsize.get(), 1000);
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.redis_url, None);
    assert_eq!(settings.cache.connect_timeout, Duration::from_millis(1000));
    assert_eq!(settings.cache.operation_timeout, Duration::from_millis(500));
    assert_eq!(settings.cache.reconnect_interval, Duration::from_secs(30));
    assert!(settings.cache.class_ttl.is_empty());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.ttl = Some(60);
    raw.cache.namespace = Some("from-file".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        cache_ttl: Some(120),
        cache_namespace: Some("from-cli".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.default_ttl, Duration::from_secs(120));
    assert_eq!(settings.cache.namespace, "from-cli");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_redis_url_means_fallback_only() {
    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.redis_url, None);
}

#[test]
fn redis_url_scheme_is_checked() {
    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some("http://cache.internal:6379".to_string());

    let err = Settings::from_raw(raw).expect_err("unsupported scheme");
    assert!(matches!(err, LoadError::Invalid { ref key, .. } if key == "cache.redis_url"));

    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some(" rediss://cache.internal:6380/2 ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cache.redis_url.as_deref(),
        Some("rediss://cache.internal:6380/2")
    );
}

#[test]
fn malformed_redis_url_is_a_configuration_error() {
    for bad in ["redis://cache.internal:notaport/", "redis://:secret@[::1"] {
        let mut raw = RawSettings::default();
        raw.cache.redis_url = Some(bad.to_string());
        assert_invalid(raw, "cache.redis_url");
    }
}

#[test]
fn zero_maxsize_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.maxsize = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(err, LoadError::Invalid { ref key, .. } if key == "cache.maxsize"));
}

fn assert_invalid(raw: RawSettings, expected: &str) {
    let err = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(
        matches!(err, LoadError::Invalid { ref key, .. } if key == expected),
        "unexpected error for {expected}: {err}"
    );
}

#[test]
fn zero_durations_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl = Some(0);
    assert_invalid(raw, "cache.ttl");

    let mut raw = RawSettings::default();
    raw.cache.connect_timeout_ms = Some(0);
    assert_invalid(raw, "cache.connect_timeout_ms");

    let mut raw = RawSettings::default();
    raw.cache.operation_timeout_ms = Some(0);
    assert_invalid(raw, "cache.operation_timeout_ms");

    let mut raw = RawSettings::default();
    raw.cache.reconnect_interval_secs = Some(0);
    assert_invalid(raw, "cache.reconnect_interval_secs");

    let mut raw = RawSettings::default();
    raw.cache.class_ttl.insert("explore".to_string(), 0);
    assert_invalid(raw, "cache.class_ttl.explore");
}

#[test]
fn namespace_must_be_a_single_segment() {
    for bad in ["", "  ", "snap front", "snap:front"] {
        let mut raw = RawSettings::default();
        raw.cache.namespace = Some(bad.to_string());
        let err = Settings::from_raw(raw).expect_err("invalid namespace");
        assert!(matches!(err, LoadError::Invalid { ref key, .. } if key == "cache.namespace"));
    }
}

#[test]
fn class_ttl_overrides_are_parsed() {
    let mut raw = RawSettings::default();
    raw.cache.class_ttl.insert("snap_info".to_string(), 600);
    raw.cache.class_ttl.insert("store-members".to_string(), 90);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cache.class_ttl.get(&ResourceClass::SnapInfo),
        Some(&Duration::from_secs(600))
    );
    assert_eq!(
        settings.cache.class_ttl.get(&ResourceClass::StoreMembers),
        Some(&Duration::from_secs(90))
    );
}

#[test]
fn unknown_class_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.class_ttl.insert("snap_infos".to_string(), 600);

    let err = Settings::from_raw(raw).expect_err("unknown class");
    assert!(
        matches!(err, LoadError::Invalid { ref key, .. } if key == "cache.class_ttl.snap_infos")
    );
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid level");
    assert!(matches!(err, LoadError::Invalid { ref key, .. } if key == "logging.level"));
}

#[test]
fn default_to_probe_command() {
    let args = CliArgs::parse_from(["snapfront"]);
    let command = args.command.unwrap_or(Command::Probe);
    assert!(matches!(command, Command::Probe));
}

#[test]
fn parse_inspect_arguments() {
    let args = CliArgs::parse_from([
        "snapfront",
        "inspect",
        "snap-info",
        "toto",
        "--as",
        "alice",
        "--cache-redis-url",
        "redis://127.0.0.1:6379/",
    ]);

    assert_eq!(
        args.overrides.cache_redis_url.as_deref(),
        Some("redis://127.0.0.1:6379/")
    );
    match args.command.expect("inspect command") {
        Command::Inspect(entry) => {
            assert_eq!(entry.class, ResourceClass::SnapInfo);
            assert_eq!(entry.resource_id, "toto");
            assert_eq!(entry.identity.as_deref(), Some("alice"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_invalidate_without_identity() {
    let args = CliArgs::parse_from(["snapfront", "invalidate", "explore", "featured"]);

    match args.command.expect("invalidate command") {
        Command::Invalidate(entry) => {
            assert_eq!(entry.class, ResourceClass::Explore);
            assert_eq!(entry.resource_id, "featured");
            assert!(entry.identity.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn unknown_class_fails_to_parse() {
    let result = CliArgs::try_parse_from(["snapfront", "inspect", "snaps", "toto"]);
    assert!(result.is_err());
}
