//! Prompt templates for the coding procedures.
//!
//! Templates are plain text with `{{key}}` placeholders, filled by
//! [`PromptBuilder`] in one pass at build time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const SEPARATOR: &str = "\n\n";

pub const ANALYSIS: &str = r#"You are an expert code analyzer. Analyze this {{language}} code and provide:
1. Complexity score (0-100)
2. Security score (0-100)
3. Performance score (0-100)
4. List of specific issues with severity (CRITICAL, WARN, INFO)

Provide response in JSON format:
{
  "complexity": number,
  "security": number,
  "performance": number,
  "issues": [{"type": "CRITICAL|WARN|INFO", "text": "description"}]
}

Code:
{{code}}"#;

pub const REFACTOR: &str = "Refactor this {{language}} code. Strategy: {{strategy}}

Provide ONLY the refactored code with inline comments explaining changes. No explanations outside the code.

Original code:
{{code}}";

pub const GENERATE: &str = "You are an expert {{language}} developer. Generate clean, production-ready code based on requirements. Include helpful comments.

Requirement: {{prompt}}";

pub const CHAT_SYSTEM: &str = "You are an expert AI coding assistant. Help with code analysis, debugging, architecture, and best practices. Be concise and practical.";

pub const REVIEW_SYSTEM: &str = "You are an expert code analyzer. Analyze the following {{language}} code for {{analysis_type}} issues. Provide specific, actionable recommendations.

Finish with a final line of the form `SCORE: <0-100>` rating the code overall.";

pub const REFACTOR_ONCE_SYSTEM: &str = "You are an expert code refactorer. Refactor the following {{language}} code to improve readability, performance, and maintainability. Provide the refactored code with explanations.";

pub const ASSISTANT_SYSTEM: &str = "You are a helpful AI coding assistant. Provide clear, concise answers about code and programming.";

/// System prompt of the interactive terminal session.
pub const TERMINAL_SYSTEM: &str = "You are CodeBuddy, an AI coding assistant that helps write, explain, debug, and refactor code.
1. Ask clarifying questions if ambiguous.
2. Provide only code unless explanation requested.
3. Use Markdown with headings for explanations.
4. Wrap code in triple backticks with language.
5. Keep responses concise but correct.";

/// Refactoring goal selected by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    #[default]
    Clean,
    Performance,
    Secure,
}

impl Strategy {
    pub fn instructions(self) -> &'static str {
        match self {
            Strategy::Clean => {
                "Focus on code cleanliness, readability, and maintainability. Remove code smells."
            }
            Strategy::Performance => {
                "Optimize for performance. Improve algorithms, reduce complexity, eliminate bottlenecks."
            }
            Strategy::Secure => {
                "Enhance security. Fix vulnerabilities, add input validation, follow security best practices."
            }
        }
    }
}

/// Kind of review requested from `code.analyzeCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Quality,
    Security,
    Performance,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Quality => "quality",
            AnalysisType::Security => "security",
            AnalysisType::Performance => "performance",
        }
    }
}

/// Joins template fragments and substitutes `{{key}}` variables.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directly append a text fragment. Blank fragments are dropped.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim().to_string();
        if !trimmed.is_empty() {
            self.parts.push(trimmed);
        }
        self
    }

    /// Register `{{key}}` → `value` substitution pairs applied at build time.
    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join the fragments with blank lines and substitute every placeholder.
    ///
    /// Substitution is a single left-to-right scan, so placeholder-looking
    /// text inside a substituted value (user code often contains `{{`) is
    /// left as is.
    pub fn build(self) -> String {
        let template = self.parts.join(SEPARATOR);
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) if self.vars.contains_key(&after[..end]) => {
                    out.push_str(&self.vars[&after[..end]]);
                    rest = &after[end + 2..];
                }
                _ => {
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
