// Request expansion for UltiBust
// hosts × paths × methods, with {placeholder} substitution and optional header fuzzing
//
// Example:
//   hosts:   ["http://a.test/"]
//   paths:   ["/api/{ver}/users", "admin"]
//   methods: [GET, HEAD]
//   params:  {"ver" => "v2"}
//   Output:  GET  http://a.test/api/v2/users
//            HEAD http://a.test/api/v2/users
//            GET  http://a.test/admin
//            HEAD http://a.test/admin

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};

use crate::models::{FuzzSpec, Method, ProbeRequest};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([^{}]+)\}").unwrap();
}

/// Replace every `{key}` present in `params`; unknown tokens are left verbatim.
pub fn substitute_path_params(path: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    PLACEHOLDER
        .replace_all(path, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Drop repeated entries, comparing on the slash-trimmed form. Keeps first-seen order.
fn dedup_entries(entries: &[String], normalize: fn(&str) -> &str) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| seen.insert(normalize(entry.trim()).to_string()))
        .cloned()
        .collect()
}

fn host_key(host: &str) -> &str {
    host.trim_end_matches('/')
}

fn path_key(path: &str) -> &str {
    path.trim_matches('/')
}

/// Build every probe request. Empty hosts, paths or methods give an empty plan.
pub fn expand(
    hosts: &[String],
    paths: &[String],
    methods: &[Method],
    params: &BTreeMap<String, String>,
    headers: &BTreeMap<String, String>,
    fuzz: Option<&FuzzSpec>,
    dedup: bool,
) -> Vec<ProbeRequest> {
    let (hosts, paths) = if dedup {
        (dedup_entries(hosts, host_key), dedup_entries(paths, path_key))
    } else {
        (hosts.to_vec(), paths.to_vec())
    };

    let paths: Vec<String> = paths
        .iter()
        .map(|path| substitute_path_params(path, params))
        .collect();

    let fuzz = fuzz.filter(|f| f.is_active());
    let width = fuzz.map_or(1, FuzzSpec::width);
    let mut requests = Vec::with_capacity(hosts.len() * paths.len() * methods.len() * width);

    for host in &hosts {
        for path in &paths {
            for method in methods {
                let base = ProbeRequest::new(host, path, method.clone(), headers.clone());
                match fuzz {
                    Some(spec) => {
                        for name in &spec.header_names {
                            for value in &spec.values {
                                requests.push(base.clone().with_fuzzed_header(name, value));
                            }
                        }
                    }
                    None => requests.push(base),
                }
            }
        }
    }

    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_substitution_replaces_known_and_keeps_unknown() {
        let mut params = BTreeMap::new();
        params.insert("ver".to_string(), "v2".to_string());
        assert_eq!(substitute_path_params("/api/{ver}/users", &params), "/api/v2/users");
        assert_eq!(substitute_path_params("/api/{missing}/{ver}", &params), "/api/{missing}/v2");
    }

    #[test]
    fn test_substitution_repeated_token() {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "7".to_string());
        assert_eq!(substitute_path_params("{id}/{id}", &params), "7/7");
    }

    #[test]
    fn test_dedup_normalizes_slashes() {
        let hosts = strings(&["http://a.test", "http://a.test/", "http://b.test"]);
        assert_eq!(dedup_entries(&hosts, host_key), strings(&["http://a.test", "http://b.test"]));
    }

    #[test]
    fn test_expand_order_is_host_path_method() {
        let reqs = expand(
            &strings(&["http://a.test"]),
            &strings(&["x", "y"]),
            &[Method::GET, Method::POST],
            &BTreeMap::new(),
            &BTreeMap::new(),
            None,
            false,
        );
        let labels: Vec<String> = reqs.iter().map(|r| format!("{} {}", r.method, r.url())).collect();
        assert_eq!(
            labels,
            strings(&[
                "GET http://a.test/x",
                "POST http://a.test/x",
                "GET http://a.test/y",
                "POST http://a.test/y",
            ])
        );
    }

    #[test]
    fn test_inactive_fuzz_spec_is_ignored() {
        let fuzz = FuzzSpec::new(strings(&["X-Original-URL"]), Vec::new());
        let reqs = expand(
            &strings(&["http://a.test"]),
            &strings(&["x"]),
            &[Method::GET],
            &BTreeMap::new(),
            &BTreeMap::new(),
            Some(&fuzz),
            false,
        );
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].fuzzed_header.is_none());
    }
}
