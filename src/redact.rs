//! Secret redaction for log lines and client-facing error messages

use once_cell::sync::Lazy;
use regex::Regex;

const MASK: &str = "[REDACTED]";

static RE_API_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)api[_-]?key["\s:=]+[a-zA-Z0-9_\-]{20,}"#).unwrap());
static RE_CLOUDCONVERT_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)cloudconvert[_\s]*api[_\s]*key["\s:=]+[a-zA-Z0-9_\-]+"#).unwrap()
});
static RE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)token["\s:=]+[a-zA-Z0-9_\-]{20,}"#).unwrap());
static RE_AUTHORIZATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)authorization["\s:]+[^\s"]+"#).unwrap());
static RE_BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[a-zA-Z0-9_\-.]+").unwrap());
static RE_OPAQUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9_\-]{32,}").unwrap());

/// Strips credentials from free text.
///
/// Two passes: every configured secret literal is masked first, then
/// pattern-based masking catches key/token shapes the process never saw
/// (for example a key echoed back by a remote service).
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Create a redactor for the given secret values. Empty values are ignored.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.trim().is_empty())
            .collect();
        // Longest first so a secret containing another is masked whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets.dedup();
        Self { secrets }
    }

    /// Redact a message
    pub fn redact(&self, message: &str) -> String {
        if message.is_empty() {
            return "An error occurred".to_string();
        }

        let mut out = message.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }

        let out = RE_API_KEY.replace_all(&out, "api_key=[REDACTED]");
        let out = RE_CLOUDCONVERT_KEY.replace_all(&out, "CLOUDCONVERT_API_KEY=[REDACTED]");
        let out = RE_TOKEN.replace_all(&out, "token=[REDACTED]");
        let out = RE_AUTHORIZATION.replace_all(&out, "authorization=[REDACTED]");
        let out = RE_BEARER.replace_all(&out, "bearer [REDACTED]");
        let out = RE_OPAQUE.replace_all(&out, MASK);
        out.into_owned()
    }
}
