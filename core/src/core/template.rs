use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Payload characters left intact when substituting into a URL or a
/// form-urlencoded body. Matches the probe semantics of keeping `&`, `=`
/// and `/` structural while encoding everything else unsafe.
const URL_PAYLOAD_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'&')
    .remove(b'=')
    .remove(b'/');

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder regex is valid"))
}

/// Where an injection point lives in the original request. Determines where
/// the placeholder must be restored and whether URL-encoding applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Query,
    BodyForm,
    BodyJson,
    Path,
}

impl std::fmt::Display for PointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointKind::Query => write!(f, "query"),
            PointKind::BodyForm => write!(f, "body_form"),
            PointKind::BodyJson => write!(f, "body_json"),
            PointKind::Path => write!(f, "path"),
        }
    }
}

/// A single spot in the captured request where a payload may be injected.
///
/// `placeholder` is the literal `{{…}}` marker used inside templates. For a
/// given flow the placeholder set is unique: the first point owning a value
/// gets `{{value}}`, later points with the same value get `{{name:value}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionPoint {
    pub name: String,
    pub original_value: String,
    pub kind: PointKind,
    pub placeholder: String,
}

pub fn make_placeholder(value: &str) -> String {
    format!("{{{{{}}}}}", value)
}

pub fn make_named_placeholder(name: &str, value: &str) -> String {
    format!("{{{{{}:{}}}}}", name, value)
}

/// Strips the `{{` / `}}` framing from a placeholder marker.
pub fn placeholder_inner(marker: &str) -> &str {
    marker
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(marker)
}

/// A request with placeholder markers, as emitted by the strategist. Shape
/// mirrors the captured request; any substring of the URL, header values or
/// body may be a `{{…}}` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: default_method(),
            target_url: String::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestTemplate {
    /// The authoritative placeholder set: every `{{…}}` marker found in the
    /// URL, header values or body.
    pub fn placeholders(&self) -> HashSet<String> {
        let mut found = HashSet::new();
        collect_placeholders(&self.target_url, &mut found);
        for value in self.headers.values() {
            collect_placeholders(value, &mut found);
        }
        if let Some(body) = &self.body {
            collect_placeholders(body, &mut found);
        }
        found
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers with `Content-Length` and `Transfer-Encoding` removed; the
    /// HTTP client recomputes framing for the mutated body.
    pub fn sanitized_headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter(|(k, _)| {
                !k.eq_ignore_ascii_case("content-length")
                    && !k.eq_ignore_ascii_case("transfer-encoding")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// True when the template body is form-urlencoded and payloads injected
    /// into it must be URL-encoded. JSON, XML, plain and absent content
    /// types are sent raw.
    pub fn body_wants_url_encoding(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_lowercase().contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }
}

fn collect_placeholders(text: &str, out: &mut HashSet<String>) {
    for m in placeholder_regex().find_iter(text) {
        out.insert(m.as_str().to_string());
    }
}

/// One strategist test case: a target placeholder plus one or more payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub parameter: String,
    #[serde(default)]
    pub payload: PayloadSet,
}

impl TestCase {
    pub fn new(parameter: impl Into<String>, payloads: Vec<String>) -> Self {
        Self {
            parameter: parameter.into(),
            payload: PayloadSet::Many(payloads),
        }
    }
}

/// The strategist may emit `"payload": "x"` or `"payload": ["x", "y"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadSet {
    One(String),
    Many(Vec<String>),
}

impl Default for PayloadSet {
    fn default() -> Self {
        PayloadSet::Many(Vec::new())
    }
}

impl PayloadSet {
    pub fn as_slice(&self) -> &[String] {
        match self {
            PayloadSet::One(p) => std::slice::from_ref(p),
            PayloadSet::Many(v) => v.as_slice(),
        }
    }
}

/// The unit of work the strategist emits and the probe engine consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredPacket {
    #[serde(default)]
    pub request: RequestTemplate,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl StructuredPacket {
    pub fn empty(request: RequestTemplate) -> Self {
        Self { request, test_cases: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }
}

/// A template string pre-split on placeholder markers. Rendering substitutes
/// token-wise, so a payload that itself contains `{{…}}` text can never
/// bleed into a second substitution pass.
#[derive(Debug, Clone)]
pub struct Tokenized {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

impl Tokenized {
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for m in placeholder_regex().find_iter(text) {
            if m.start() > cursor {
                segments.push(Segment::Literal(text[cursor..m.start()].to_string()));
            }
            segments.push(Segment::Placeholder(m.as_str().to_string()));
            cursor = m.end();
        }
        if cursor < text.len() {
            segments.push(Segment::Literal(text[cursor..].to_string()));
        }
        Self { segments }
    }

    /// Renders the string for one probe: the `active` placeholder becomes
    /// the payload (URL-encoded when `url_encode`), every other placeholder
    /// is restored to its original value.
    pub fn render(
        &self,
        active: &str,
        payload: &str,
        originals: &HashMap<String, String>,
        url_encode: bool,
    ) -> String {
        let encoded;
        let injected: &str = if url_encode {
            encoded = utf8_percent_encode(payload, URL_PAYLOAD_KEEP).to_string();
            &encoded
        } else {
            payload
        };

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(marker) if marker == active => out.push_str(injected),
                Segment::Placeholder(marker) => match originals.get(marker) {
                    Some(original) => out.push_str(original),
                    None => out.push_str(placeholder_inner(marker)),
                },
            }
        }
        out
    }
}

/// Builds the placeholder → original-value restore map for one probe run.
/// Registered injection points are authoritative; markers the strategist
/// invented fall back to their inner text.
pub fn restore_map(points: &[InjectionPoint]) -> HashMap<String, String> {
    points
        .iter()
        .map(|p| (p.placeholder.clone(), p.original_value.clone()))
        .collect()
}
