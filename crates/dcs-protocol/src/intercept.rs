use serde::{Deserialize, Serialize};

use crate::mode::{CodeChannel, InterceptStage};

/// A single parsed G/M/T-code, as offered to an Intercept-mode connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedCode {
    #[serde(rename = "type")]
    pub code_type: CodeType,
    #[serde(rename = "majorNumber", skip_serializing_if = "Option::is_none")]
    pub major_number: Option<u32>,
    #[serde(rename = "minorNumber", skip_serializing_if = "Option::is_none")]
    pub minor_number: Option<u32>,
    pub channel: CodeChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<InterceptStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeType {
    G,
    M,
    T,
    Comment,
}

/// Result payload a `Resolve` verdict completes the intercepted code with.
/// Mirrors the reply a code's originator would have gotten from ordinary
/// execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// The three verdicts an Intercept connection may return for an offered
/// code. Tagged the same way `Command` is, for the same reason: bit-exact
/// wire compatibility via an explicit discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Verdict {
    Ignore,
    Cancel,
    Resolve { result: CodeResult },
}
