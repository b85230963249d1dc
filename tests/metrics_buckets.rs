use chunk_ingest::monitoring::metrics::__test_parse_buckets_env;

#[test]
fn test_parse_buckets_env_valid() {
    std::env::set_var("CHUNKING_HISTO_BUCKETS_T1", "5, 10, 1, 20, 5");
    let parsed = __test_parse_buckets_env("CHUNKING_HISTO_BUCKETS_T1");
    assert_eq!(parsed, Some(vec![1.0, 5.0, 10.0, 20.0]));
    std::env::remove_var("CHUNKING_HISTO_BUCKETS_T1");
}

#[test]
fn test_parse_buckets_env_invalid_token_falls_back() {
    for (var, value) in [
        ("COLLABORATOR_HISTO_BUCKETS_T2", "50, abc, 100"),
        ("COLLABORATOR_HISTO_BUCKETS_T3", "-1, 10"),
        ("COLLABORATOR_HISTO_BUCKETS_T4", "10, inf"),
    ] {
        std::env::set_var(var, value);
        // invalid token causes None (defaults at call site)
        assert_eq!(__test_parse_buckets_env(var), None, "{value}");
        std::env::remove_var(var);
    }
}

#[test]
fn test_parse_buckets_env_empty_falls_back() {
    std::env::set_var("REQUEST_HISTO_BUCKETS_T5", "   ");
    assert_eq!(__test_parse_buckets_env("REQUEST_HISTO_BUCKETS_T5"), None);
    std::env::remove_var("REQUEST_HISTO_BUCKETS_T5");
    assert_eq!(__test_parse_buckets_env("REQUEST_HISTO_BUCKETS_UNSET"), None);
}
