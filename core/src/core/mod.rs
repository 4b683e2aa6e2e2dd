pub mod diff;
pub mod executor;
pub mod points;
pub mod template;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Vulnerability classes the manager can dispatch a worker for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VulnKind {
    Sqli,
    Xss,
    Fuzz,
}

impl VulnKind {
    /// Parses one manager token. Unknown tokens yield `None` and are ignored
    /// by the caller.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "sqli" => Some(VulnKind::Sqli),
            "xss" => Some(VulnKind::Xss),
            "fuzz" => Some(VulnKind::Fuzz),
            _ => None,
        }
    }
}

impl std::fmt::Display for VulnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VulnKind::Sqli => write!(f, "sqli"),
            VulnKind::Xss => write!(f, "xss"),
            VulnKind::Fuzz => write!(f, "fuzz"),
        }
    }
}

/// Routing decision returned by the analyzer at the end of a worker round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Found,
    Retry,
    #[default]
    GiveUp,
}

impl Decision {
    /// Lenient parse of the analyzer's `decision` field. Anything
    /// unrecognized degrades to `GiveUp`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "found" => Decision::Found,
            "retry" => Decision::Retry,
            _ => Decision::GiveUp,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Found => write!(f, "FOUND"),
            Decision::Retry => write!(f, "RETRY"),
            Decision::GiveUp => write!(f, "GIVE_UP"),
        }
    }
}

/// The request that produced a finding, replayed verbatim in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// A confirmed (by the analyzer) vulnerability, persisted to the relational
/// store and rendered into the Markdown report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub request_id: String,
    pub vuln_type: String,
    pub url: String,
    pub method: String,
    pub parameter: Option<String>,
    pub payload: Option<String>,
    pub evidence: String,
    pub severity: String,
    pub full_request: FullRequest,
}
