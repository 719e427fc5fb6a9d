//! Turning model replies into structured results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_SCORE: u8 = 50;

/// Score used by `code.analyzeCode` when the reply carries no `SCORE:` line.
pub const DEFAULT_REVIEW_SCORE: i64 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warn,
    Info,
}

impl Severity {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "WARN" | "WARNING" => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub text: String,
}

/// Output of `analyzeCode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnalysis {
    pub complexity: u8,
    pub security: u8,
    pub performance: u8,
    pub issues: Vec<Issue>,
}

impl CodeAnalysis {
    /// Neutral scores plus one `INFO` issue holding the raw reply.
    fn unparsed(content: &str) -> Self {
        Self {
            complexity: DEFAULT_SCORE,
            security: DEFAULT_SCORE,
            performance: DEFAULT_SCORE,
            issues: vec![Issue { severity: Severity::Info, text: content.to_string() }],
        }
    }
}

/// Parse the model's JSON analysis.
///
/// A surrounding markdown fence is stripped, and if the reply has prose
/// around the object the outermost `{…}` is tried. Missing or non-numeric
/// scores become 50; numeric scores are rounded and clamped to 0..=100.
pub fn parse_analysis(content: &str) -> CodeAnalysis {
    // An empty reply reads as `{}`: neutral scores, no issues.
    if content.trim().is_empty() {
        return CodeAnalysis { issues: Vec::new(), ..CodeAnalysis::unparsed("") };
    }
    let body = strip_code_fence(content);
    let value = serde_json::from_str::<Value>(body)
        .ok()
        .filter(Value::is_object)
        .or_else(|| {
            let start = body.find('{')?;
            let end = body.rfind('}')?;
            serde_json::from_str::<Value>(body.get(start..=end)?)
                .ok()
                .filter(Value::is_object)
        });

    let Some(value) = value else {
        return CodeAnalysis::unparsed(content);
    };

    let issues = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_issue).collect())
        .unwrap_or_default();

    CodeAnalysis {
        complexity: score(&value, "complexity"),
        security: score(&value, "security"),
        performance: score(&value, "performance"),
        issues,
    }
}

fn score(value: &Value, key: &str) -> u8 {
    let n = match value.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_SCORE,
    }
}

fn parse_issue(item: &Value) -> Option<Issue> {
    match item {
        Value::String(text) => Some(Issue { severity: Severity::Info, text: text.clone() }),
        Value::Object(obj) => {
            let text = obj
                .get("text")
                .or_else(|| obj.get("description"))
                .and_then(Value::as_str)?;
            let severity = obj
                .get("type")
                .or_else(|| obj.get("severity"))
                .and_then(Value::as_str)
                .map(Severity::parse)
                .unwrap_or(Severity::Info);
            Some(Issue { severity, text: text.to_string() })
        }
        _ => None,
    }
}

/// Remove a leading ```lang line and a trailing ``` if both are present.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.split_once('\n') {
        Some((_lang, inner)) => inner.trim(),
        None => body.trim(),
    }
}

/// Overall score from a trailing `SCORE: N` line, clamped to 0..=100.
pub fn extract_score(content: &str) -> Option<i64> {
    content.lines().rev().find_map(|line| {
        let line = line.trim().trim_matches(|c| c == '*' || c == '`').trim();
        let (label, rest) = line.split_once(':')?;
        if !label.trim().eq_ignore_ascii_case("score") {
            return None;
        }
        let digits: String = rest
            .trim()
            .trim_start_matches(|c| c == '*' || c == '`')
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<i64>().ok().map(|n| n.clamp(0, 100))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_is_neutral_without_issues() {
        for reply in ["", "  \n"] {
            let a = parse_analysis(reply);
            assert_eq!((a.complexity, a.security, a.performance), (50, 50, 50));
            assert!(a.issues.is_empty());
        }
    }

    #[test]
    fn plain_json() {
        let a = parse_analysis(
            r#"{"complexity": 30, "security": 80, "performance": 65,
                "issues": [{"type": "WARN", "text": "unused var"}]}"#,
        );
        assert_eq!((a.complexity, a.security, a.performance), (30, 80, 65));
        assert_eq!(a.issues, vec![Issue { severity: Severity::Warn, text: "unused var".into() }]);
    }

    #[test]
    fn fenced_json_with_zero_score() {
        let a = parse_analysis("```json\n{\"complexity\": 0, \"security\": 100, \"performance\": 12.6}\n```");
        assert_eq!((a.complexity, a.security, a.performance), (0, 100, 13));
        assert!(a.issues.is_empty());
    }

    #[test]
    fn missing_and_bad_scores_default() {
        let a = parse_analysis(r#"{"complexity": "high", "security": 250, "issues": "none"}"#);
        assert_eq!((a.complexity, a.security, a.performance), (50, 100, 50));
        assert!(a.issues.is_empty());
    }

    #[test]
    fn unknown_severity_is_info() {
        let a = parse_analysis(
            r#"{"issues": [{"type": "BLOCKER", "text": "a"}, {"severity": "critical", "text": "b"}, {"type": "WARN"}]}"#,
        );
        assert_eq!(
            a.issues,
            vec![
                Issue { severity: Severity::Info, text: "a".into() },
                Issue { severity: Severity::Critical, text: "b".into() },
            ]
        );
    }

    #[test]
    fn prose_around_object() {
        let a = parse_analysis("Here you go:\n{\"complexity\": 10}\nHope it helps.");
        assert_eq!(a.complexity, 10);
    }

    #[test]
    fn unparseable_reply() {
        let a = parse_analysis("The code looks fine.");
        assert_eq!(a, CodeAnalysis::unparsed("The code looks fine."));
        assert_eq!(a.issues[0].severity, Severity::Info);
    }

    #[test]
    fn issue_serializes_with_type_key() {
        let json = serde_json::to_value(Issue { severity: Severity::Critical, text: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "CRITICAL", "text": "x"}));
    }

    #[test]
    fn fence_stripping() {
        assert_eq!(strip_code_fence("```\nabc\n```"), "abc");
        assert_eq!(strip_code_fence("  plain  "), "plain");
        assert_eq!(strip_code_fence("```rust\nfn main() {}\n```"), "fn main() {}");
        assert_eq!(strip_code_fence("```unterminated"), "```unterminated");
    }

    #[test]
    fn score_line() {
        assert_eq!(extract_score("Looks ok.\n\nSCORE: 82"), Some(82));
        assert_eq!(extract_score("**Score:** 140/100"), Some(100));
        assert_eq!(extract_score("no rating here"), None);
        assert_eq!(extract_score("Score: n/a"), None);
    }
}
