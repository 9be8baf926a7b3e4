// Input list parsing for UltiBust
// Turns already-read file contents into hosts, paths, headers and params

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::models::Method;

/// Newline-delimited list: entries are trimmed, blanks and `#` comments dropped.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `Name: value` per line. Splits on the first colon so values like URLs survive.
pub fn parse_header_lines(text: &str) -> BTreeMap<String, String> {
    parse_pairs(text, ':')
}

/// `key=value` per line, used for `{key}` path placeholders.
pub fn parse_param_lines(text: &str) -> BTreeMap<String, String> {
    parse_pairs(text, '=')
}

fn parse_pairs(text: &str, separator: char) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    for line in parse_lines(text) {
        if let Some((name, value)) = line.split_once(separator) {
            let name = name.trim();
            if !name.is_empty() {
                pairs.insert(name.to_string(), value.trim().to_string());
            }
        }
    }
    pairs
}

/// Comma-separated method list such as `GET,post, HEAD,PROPFIND`.
pub fn parse_methods(list: &str) -> Result<Vec<Method>, ConfigError> {
    let methods = list
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Method>, _>>()?;
    if methods.is_empty() {
        return Err(ConfigError::NoMethods);
    }
    Ok(methods)
}
