/// Unit tests for core UltiBust modules
/// Tests models, request expansion and the retry policy through the public API
use std::collections::BTreeMap;
use std::time::Duration;

use ultibust::expander::{expand, substitute_path_params};
use ultibust::models::{FuzzSpec, Method, ProbeOutcome};
use ultibust::retry::{decide, Action, RetryPolicy};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn no_map() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[test]
fn test_method_display() {
    assert_eq!(Method::GET.to_string(), "GET");
    assert_eq!(Method::POST.to_string(), "POST");
    assert_eq!(Method::PUT.to_string(), "PUT");
    assert_eq!(Method::DELETE.to_string(), "DELETE");
    assert_eq!(Method::PATCH.to_string(), "PATCH");
    assert_eq!(Method::OPTIONS.to_string(), "OPTIONS");
    assert_eq!(Method::HEAD.to_string(), "HEAD");
    assert_eq!(Method::CONNECT.to_string(), "CONNECT");
    assert_eq!(Method::TRACE.to_string(), "TRACE");
}

// ============================================
// Expansion counts
// ============================================

#[test]
fn test_expansion_is_full_cartesian_product() {
    let hosts = strings(&["http://a.test", "http://b.test", "http://c.test"]);
    let paths = strings(&["admin", "login", "api", "backup"]);
    let methods = [Method::GET, Method::HEAD];

    let reqs = expand(&hosts, &paths, &methods, &no_map(), &no_map(), None, false);
    assert_eq!(reqs.len(), 3 * 4 * 2);
}

#[test]
fn test_fuzzing_multiplies_by_names_times_values() {
    let hosts = strings(&["http://a.test", "http://b.test"]);
    let paths = strings(&["admin"]);
    let methods = [Method::GET, Method::POST, Method::PUT];
    let fuzz = FuzzSpec::new(
        strings(&["X-Forwarded-For", "X-Original-URL"]),
        strings(&["127.0.0.1", "localhost", "/admin", "0"]),
    );

    let reqs = expand(&hosts, &paths, &methods, &no_map(), &no_map(), Some(&fuzz), false);
    assert_eq!(reqs.len(), (2 * 1 * 3) * 2 * 4);
    assert!(reqs.iter().all(|r| r.fuzzed_header.is_some() && r.fuzzed_value.is_some()));

    let overridden = reqs
        .iter()
        .filter(|r| r.headers.get("X-Original-URL").map(String::as_str) == Some("/admin"))
        .count();
    assert_eq!(overridden, 2 * 3);
}

#[test]
fn test_fuzzing_keeps_static_headers() {
    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Bearer abc".to_string());
    let fuzz = FuzzSpec::new(strings(&["X-Real-IP"]), strings(&["1.1.1.1"]));

    let reqs = expand(
        &strings(&["http://a.test"]),
        &strings(&["x"]),
        &[Method::GET],
        &no_map(),
        &headers,
        Some(&fuzz),
        false,
    );
    assert_eq!(reqs[0].headers.len(), 2);
    assert_eq!(reqs[0].headers.get("Authorization").map(String::as_str), Some("Bearer abc"));
}

#[test]
fn test_empty_inputs_give_empty_plan() {
    let methods = [Method::GET];
    assert!(expand(&[], &strings(&["admin"]), &methods, &no_map(), &no_map(), None, false).is_empty());
    assert!(expand(&strings(&["http://a.test"]), &[], &methods, &no_map(), &no_map(), None, false).is_empty());
}

#[test]
fn test_dedup_collapses_duplicate_lines_before_expansion() {
    let once = expand(
        &strings(&["http://a.test"]),
        &strings(&["admin", "login"]),
        &[Method::GET],
        &no_map(),
        &no_map(),
        None,
        true,
    );
    let twice = expand(
        &strings(&["http://a.test", "http://a.test", "http://a.test/"]),
        &strings(&["admin", "/admin/", "login", "admin"]),
        &[Method::GET],
        &no_map(),
        &no_map(),
        None,
        true,
    );
    assert_eq!(once.len(), twice.len());
    assert_eq!(once, twice);
}

#[test]
fn test_without_dedup_duplicates_are_probed() {
    let reqs = expand(
        &strings(&["http://a.test", "http://a.test"]),
        &strings(&["admin"]),
        &[Method::GET],
        &no_map(),
        &no_map(),
        None,
        false,
    );
    assert_eq!(reqs.len(), 2);
}

// ============================================
// Path substitution
// ============================================

#[test]
fn test_path_substitution() {
    let mut params = BTreeMap::new();
    params.insert("ver".to_string(), "v2".to_string());

    assert_eq!(substitute_path_params("/api/{ver}/users", &params), "/api/v2/users");
    assert_eq!(substitute_path_params("/api/{missing}", &params), "/api/{missing}");

    let reqs = expand(
        &strings(&["http://a.test/"]),
        &strings(&["/api/{ver}/users"]),
        &[Method::GET],
        &params,
        &no_map(),
        None,
        false,
    );
    assert_eq!(reqs[0].url(), "http://a.test/api/v2/users");
}

// ============================================
// Retry policy
// ============================================

fn failure() -> ProbeOutcome {
    ProbeOutcome::TransportFailure { elapsed: Duration::ZERO }
}

fn throttled() -> ProbeOutcome {
    ProbeOutcome::Throttled {
        status_code: 529,
        content_length: 0,
        elapsed: Duration::ZERO,
        recorded_headers: BTreeMap::new(),
    }
}

#[test]
fn test_transport_failure_retry_budget() {
    let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30), 529);
    assert_eq!(decide(&failure(), 1, &policy), Action::RetryImmediately);
    assert_eq!(decide(&failure(), 4, &policy), Action::GiveUp);
}

#[test]
fn test_throttle_delays_30_60_90() {
    let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30), 529);
    let delays: Vec<Action> = (1..=3).map(|n| decide(&throttled(), n, &policy)).collect();
    assert_eq!(
        delays,
        vec![
            Action::RetryAfter(Duration::from_secs(30)),
            Action::RetryAfter(Duration::from_secs(60)),
            Action::RetryAfter(Duration::from_secs(90)),
        ]
    );
}
