//! SQL and NoSQL injection probes.
//!
//! Both probes inject payloads into the endpoint's query parameters (or a synthetic
//! `id` parameter when there are none) and look for database error signatures in the
//! response. Signatures already present in the unmodified response are ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use url::Url;

use super::{ProbeOutcome, Verdict};
use crate::scan::context::{ProbeContext, ProbeResponse};
use crate::scan::types::Endpoint;

/// Parameters injected per payload
const MAX_INJECTED_PARAMS: usize = 3;

/// Parameter used when the endpoint URL has no query
const FALLBACK_PARAM: &str = "id";

const SQL_PAYLOADS: &[&str] = &["'", "' OR '1'='1"];

static SQL_ERROR_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(you have an error in your sql syntax|warning: mysql|mysql_fetch|mysqli_sql_exception",
        r"|unclosed quotation mark after the character string|pg_query\(\)|psycopg2\.errors?",
        r"|unterminated quoted string|syntax error at or near|incorrect syntax near",
        r"|microsoft ole db provider|sqlite_error|sqlite3::exception|unrecognized token",
        r"|quoted string not properly terminated|ora-\d{5}|sqlstate\[\w+\]|pdoexception",
        r"|unknown column|sqlexception)",
    ))
    .expect("SQL error signature pattern is valid")
});

static NOSQL_ERROR_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(mongoerror|mongoservererror|mongoose validat|bsonerror|invalid bson",
        r"|cast to objectid failed|unknown query operator|unknown operator: \$",
        r"|\$where is not allowed|cannot apply \$where|couchdb|illegal \$)",
    ))
    .expect("NoSQL error signature pattern is valid")
});

/// Copies of `url`, each with one query parameter rewritten by `rewrite`.
pub(super) fn with_rewritten_params(url: &Url, rewrite: impl Fn(&str, &str) -> (String, String)) -> Vec<Url> {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        let mut injected = url.clone();
        let (key, value) = rewrite(FALLBACK_PARAM, "1");
        injected.query_pairs_mut().append_pair(&key, &value);
        return vec![injected];
    }

    (0..pairs.len().min(MAX_INJECTED_PARAMS))
        .map(|target| {
            let mut injected = url.clone();
            {
                let mut query = injected.query_pairs_mut();
                query.clear();
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i == target {
                        let (k, v) = rewrite(key, value);
                        query.append_pair(&k, &v);
                    } else {
                        query.append_pair(key, value);
                    }
                }
            }
            injected
        })
        .collect()
}

fn signature_match<'a>(signature: &Regex, response: &'a ProbeResponse) -> Option<&'a str> {
    signature.find(&response.body).map(|m| m.as_str())
}

/// Fails when a quote payload provokes a SQL error the baseline does not show.
pub(super) async fn check_sql_injection(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let baseline = ctx.send(ctx.base_request(endpoint)).await?;
    if let Some(existing) = signature_match(&SQL_ERROR_SIGNATURE, &baseline) {
        log::debug!(
            "Baseline of {} already shows SQL error text '{}'",
            ctx.url(),
            existing
        );
        return Ok(Verdict::Pass(
            "Baseline response already contains SQL error text; inconclusive".to_string(),
        ));
    }

    for payload in SQL_PAYLOADS {
        let urls = with_rewritten_params(ctx.url(), |k, v| {
            (k.to_string(), format!("{}{}", v, payload))
        });
        for url in urls {
            let mut request = ctx.base_request(endpoint);
            request.url = url;
            let response = ctx.send(request).await?;
            if let Some(signature) = signature_match(&SQL_ERROR_SIGNATURE, &response) {
                return Ok(Verdict::Fail(format!(
                    "Payload {:?} triggered database error '{}' (status {})",
                    payload, signature, response.status
                )));
            }
        }
    }
    Ok(Verdict::Pass("No SQL error disclosed for quote payloads".to_string()))
}

/// Replaces every top-level value of a JSON object body with `{"$ne": null}`.
fn operator_body(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Object(map) if !map.is_empty() => {
            let injected: serde_json::Map<String, Value> = map
                .into_iter()
                .map(|(k, _)| (k, json!({ "$ne": null })))
                .collect();
            Some(Value::Object(injected).to_string())
        }
        _ => None,
    }
}

/// Fails when query operators (`param[$ne]`) or a `$ne` JSON body provoke a NoSQL
/// error the baseline does not show.
pub(super) async fn check_nosql_injection(ctx: &ProbeContext, endpoint: &Endpoint) -> ProbeOutcome {
    let baseline = ctx.send(ctx.base_request(endpoint)).await?;
    if NOSQL_ERROR_SIGNATURE.is_match(&baseline.body) {
        return Ok(Verdict::Pass(
            "Baseline response already contains NoSQL error text; inconclusive".to_string(),
        ));
    }

    let mut requests: Vec<_> = with_rewritten_params(ctx.url(), |k, _| (format!("{}[$ne]", k), String::new()))
        .into_iter()
        .map(|url| {
            let mut request = ctx.base_request(endpoint);
            request.url = url;
            request
        })
        .collect();
    if let Some(body) = endpoint.body.as_deref().and_then(operator_body) {
        requests.push(
            ctx.base_request(endpoint)
                .header("Content-Type", "application/json")
                .body(Some(body)),
        );
    }

    for request in requests {
        let response = ctx.send(request).await?;
        if let Some(signature) = signature_match(&NOSQL_ERROR_SIGNATURE, &response) {
            return Ok(Verdict::Fail(format!(
                "Operator injection triggered NoSQL error '{}' (status {})",
                signature, response.status
            )));
        }
    }
    Ok(Verdict::Pass("No NoSQL error disclosed for operator payloads".to_string()))
}
