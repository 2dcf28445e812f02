//! Secret redaction for outbound text.
//!
//! Applied once, to the finished report, right before it leaves the process.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Scrubs suspected secrets from text.
pub trait Redactor: Send + Sync {
    fn redact(&self, text: &str) -> String;
}

struct Rule {
    label: &'static str,
    pattern: Regex,
}

fn rule(label: &'static str, pattern: &str) -> Rule {
    Rule {
        label,
        pattern: Regex::new(pattern).expect("redaction pattern should compile"),
    }
}

// Ordered: specific token formats first, generic assignments last. A rule
// with a `secret` group only replaces that group.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "Private Key",
            r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----",
        ),
        rule("AWS Access Key", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
        rule("GitHub Token", r"\b(?:gh[pousr]_[A-Za-z0-9]{36,}|github_pat_[A-Za-z0-9_]{22,})"),
        rule("Slack Token", r"\bxox[abposr]-[A-Za-z0-9-]{10,}"),
        rule(
            "JSON Web Token",
            r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
        ),
        rule(
            "Basic Auth Credentials",
            r"[a-zA-Z][a-zA-Z0-9+.-]*://[^\s:/@]+:(?P<secret>[^\s:/@]+)@",
        ),
        rule("Bearer Token", r"(?i)\bbearer\s+(?P<secret>[A-Za-z0-9._~+/=-]{16,})"),
        rule(
            "Secret Keyword",
            r#"(?i)\b(?:api[_-]?key|secret|password|passwd|token|access[_-]?key)\b["']?\s*[:=]\s*["']?(?P<secret>[^\s"',;\[][^\s"',;]{7,})"#,
        ),
    ]
});

/// Regex-based redactor covering common credential formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternRedactor;

impl PatternRedactor {
    pub fn new() -> Self {
        Self
    }
}

fn replace(caps: &Captures<'_>, label: &str) -> String {
    let replacement = format!("[REDACTED: {label}]");
    let whole = &caps[0];
    match caps.name("secret") {
        Some(secret) => {
            let start = secret.start() - caps.get(0).map_or(0, |m| m.start());
            let end = start + secret.as_str().len();
            format!("{}{}{}", &whole[..start], replacement, &whole[end..])
        }
        None => replacement,
    }
}

impl Redactor for PatternRedactor {
    fn redact(&self, text: &str) -> String {
        RULES.iter().fold(text.to_string(), |acc, rule| {
            rule.pattern
                .replace_all(&acc, |caps: &Captures<'_>| replace(caps, rule.label))
                .into_owned()
        })
    }
}
