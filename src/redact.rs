//! PII redaction. A pure function that replaces sensitive substrings with
//! fixed placeholders. Applied to log fields, prompt content sent upstream,
//! and user-facing error messages, never to the classification the caller
//! gets back.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+").unwrap());
static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CC_CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b").unwrap()
});
static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b").unwrap());
static APIKEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:sk-[A-Za-z0-9]{16,}|gsk_[A-Za-z0-9]{16,}|glc_[A-Za-z0-9]{16,}|[A-Za-z0-9_-]{32,})\b").unwrap());

/// Replace every PII-like substring of `s` with a fixed placeholder. Patterns
/// are applied in a fixed order, each seeing the output of the previous pass,
/// so a credit card number embedded in an already-redacted phone number isn't
/// double-matched against the original text.
pub fn redact(s: &str) -> String {
    let mut out = EMAIL_RE.replace_all(s, "<EMAIL>").into_owned();
    out = SSN_RE.replace_all(&out, "<SSN>").into_owned();
    out = redact_credit_cards(&out);
    out = PHONE_RE.replace_all(&out, "<PHONE>").into_owned();
    out = IPV4_RE.replace_all(&out, "<IP>").into_owned();
    out = APIKEY_RE.replace_all(&out, "<APIKEY>").into_owned();
    out
}

/// Recursively redact every string leaf of a JSON value, leaving object keys,
/// array shape, and non-string leaves untouched.
pub fn redact_value(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::String(s) => serde_json::Value::String(redact(s)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_credit_cards(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for m in CC_CANDIDATE_RE.find_iter(s) {
        let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
            out.push_str(&s[last_end..m.start()]);
            out.push_str("<CC>");
            last_end = m.end();
        }
    }
    out.push_str(&s[last_end..]);
    out
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    let mut double = false;
    for c in digits.chars().rev() {
        let mut d = c.to_digit(10).unwrap();
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}
