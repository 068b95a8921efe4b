//! Connection string normalization for PostgreSQL URLs.
//!
//! The configured URL is completed with a connect timeout derived from the
//! run timeout, and with `sslmode=disable` when it names no TLS mode at all.
//! The TLS default keeps older deployment targets reachable; it is not a
//! recommendation.

use std::time::Duration;

pub const CONNECT_TIMEOUT_KEY: &str = "connect_timeout";
pub const SSL_DISABLED: &str = "sslmode=disable";

const SSL_MODE_KEYS: [&str; 2] = ["sslmode", "ssl-mode"];

/// Normalize `raw` for a run whose timeout is `timeout`.
///
/// - trailing `&`, `?` and `;` separators are trimmed
/// - any existing `connect_timeout` parameter is replaced by one carrying
///   `timeout` in whole seconds
/// - `sslmode=disable` is appended only if no `sslmode`/`ssl-mode` is present
pub fn normalize_connection_string(raw: &str, timeout: Duration) -> String {
    let trimmed = raw.trim().trim_end_matches(['&', '?', ';']);
    let (base, query) = split_query(trimmed);

    let mut params: Vec<String> = query_params(query)
        .filter(|param| !key_is(param, CONNECT_TIMEOUT_KEY))
        .map(str::to_string)
        .collect();
    let has_ssl_mode = params
        .iter()
        .any(|param| SSL_MODE_KEYS.iter().any(|key| key_is(param, key)));

    params.push(format!("{CONNECT_TIMEOUT_KEY}={}", timeout.as_secs()));
    if !has_ssl_mode {
        params.push(SSL_DISABLED.to_string());
    }

    format!("{base}?{}", params.join("&"))
}

/// Split the `connect_timeout` parameter off a normalized URL.
///
/// The driver does not understand `connect_timeout`, so the caller enforces it
/// and hands the remaining URL to the driver.
pub fn take_connect_timeout(url: &str) -> (String, Option<Duration>) {
    let (base, query) = split_query(url);
    let mut timeout = None;
    let mut rest = Vec::new();
    for param in query_params(query) {
        if key_is(param, CONNECT_TIMEOUT_KEY) {
            timeout = param
                .split_once('=')
                .and_then(|(_, value)| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
        } else {
            rest.push(param);
        }
    }

    if rest.is_empty() {
        (base.to_string(), timeout)
    } else {
        (format!("{base}?{}", rest.join("&")), timeout)
    }
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    }
}

fn query_params(query: Option<&str>) -> impl Iterator<Item = &str> {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter(|param| !param.is_empty())
}

fn key_is(param: &str, key: &str) -> bool {
    let name = param.split_once('=').map_or(param, |(name, _)| name);
    name.trim().eq_ignore_ascii_case(key)
}
