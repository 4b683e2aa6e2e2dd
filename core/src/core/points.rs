use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde_json::Value;

use crate::core::template::{
    make_named_placeholder, make_placeholder, InjectionPoint, PointKind, RequestTemplate,
};

/// Derives every injection point the deterministic analyzer can see: URL
/// query pairs, body parameters (JSON object first, form-urlencoded second)
/// and RESTful path segments that look like identifiers.
pub fn derive_injection_points(url: &str, body: Option<&str>) -> Vec<InjectionPoint> {
    let mut registry = PointRegistry::default();

    if let Some((_, query)) = url.split_once('?') {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if !name.is_empty() {
                    registry.push(name, value, PointKind::Query);
                }
            }
        }
    }

    if let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) {
        if body.starts_with('{') {
            match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(map)) => {
                    for (key, value) in &map {
                        if let Some(scalar) = scalar_text(value) {
                            registry.push(key, &scalar, PointKind::BodyJson);
                        }
                    }
                }
                _ => debug!("body looks like JSON but did not parse as an object"),
            }
        } else if body.contains('=') {
            for pair in body.split('&') {
                if let Some((name, value)) = pair.split_once('=') {
                    if !name.is_empty() {
                        registry.push(name, value, PointKind::BodyForm);
                    }
                }
            }
        }
    }

    if let Some(path) = url_path(url) {
        for (index, segment) in path.split('/').enumerate() {
            if looks_like_path_id(segment) {
                registry.push(&format!("path_{}", index), segment, PointKind::Path);
            }
        }
    }

    registry.points
}

/// Builds the zero-LLM first-round template: the captured request with the
/// selected points' values swapped for their placeholders.
pub fn build_first_round_template(
    method: &str,
    url: &str,
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
    points: &[InjectionPoint],
) -> RequestTemplate {
    let mut consumed = vec![false; points.len()];

    let target_url = {
        let with_query = rewrite_pairs_after(url, '?', points, PointKind::Query, &mut consumed);
        rewrite_path(&with_query, points, PointKind::Path, &mut consumed)
    };

    let body = body.map(|raw| {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            rewrite_json_body(trimmed, points, &mut consumed).unwrap_or_else(|| raw.to_string())
        } else if trimmed.contains('=') {
            rewrite_form_body(raw, points, &mut consumed)
        } else {
            raw.to_string()
        }
    });

    RequestTemplate {
        method: method.to_string(),
        target_url,
        headers: headers.clone(),
        body,
    }
}

#[derive(Default)]
struct PointRegistry {
    points: Vec<InjectionPoint>,
    used_placeholders: HashSet<String>,
}

impl PointRegistry {
    fn push(&mut self, name: &str, value: &str, kind: PointKind) {
        // Same name and value twice is the same scanning target.
        if self
            .points
            .iter()
            .any(|p| p.name == name && p.original_value == value && p.kind == kind)
        {
            return;
        }
        let mut placeholder = make_placeholder(value);
        if self.used_placeholders.contains(&placeholder) {
            placeholder = make_named_placeholder(name, value);
        }
        if !self.used_placeholders.insert(placeholder.clone()) {
            return;
        }
        self.points.push(InjectionPoint {
            name: name.to_string(),
            original_value: value.to_string(),
            kind,
            placeholder,
        });
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Object(_) | Value::Array(_) => None,
    }
}

/// A segment is treated as a RESTful identifier when it is all digits, or
/// long and hyphenated (UUIDs, opaque tokens).
fn looks_like_path_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    segment.chars().all(|c| c.is_ascii_digit()) || (segment.len() > 30 && segment.contains('-'))
}

/// The path portion of a URL, without scheme, authority or query.
fn url_path(url: &str) -> Option<&str> {
    let without_query = url.split('?').next().unwrap_or(url);
    let after_scheme = match without_query.find("://") {
        Some(idx) => &without_query[idx + 3..],
        None => without_query,
    };
    after_scheme.find('/').map(|idx| &after_scheme[idx..])
}

fn rewrite_pairs_after(
    url: &str,
    separator: char,
    points: &[InjectionPoint],
    kind: PointKind,
    consumed: &mut [bool],
) -> String {
    let Some((base, query)) = url.split_once(separator) else {
        return url.to_string();
    };
    let rewritten = rewrite_pairs(query, points, kind, consumed);
    format!("{}{}{}", base, separator, rewritten)
}

fn rewrite_form_body(body: &str, points: &[InjectionPoint], consumed: &mut [bool]) -> String {
    rewrite_pairs(body, points, PointKind::BodyForm, consumed)
}

fn rewrite_pairs(
    pairs: &str,
    points: &[InjectionPoint],
    kind: PointKind,
    consumed: &mut [bool],
) -> String {
    pairs
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => {
                for (idx, point) in points.iter().enumerate() {
                    if !consumed[idx]
                        && point.kind == kind
                        && point.name == name
                        && point.original_value == value
                    {
                        consumed[idx] = true;
                        return format!("{}={}", name, point.placeholder);
                    }
                }
                pair.to_string()
            }
            None => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn rewrite_json_body(
    body: &str,
    points: &[InjectionPoint],
    consumed: &mut [bool],
) -> Option<String> {
    let Value::Object(mut map) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };
    for (idx, point) in points.iter().enumerate() {
        if consumed[idx] || point.kind != PointKind::BodyJson {
            continue;
        }
        if let Some(slot) = map.get_mut(&point.name) {
            if scalar_text(slot).as_deref() == Some(point.original_value.as_str()) {
                *slot = Value::String(point.placeholder.clone());
                consumed[idx] = true;
            }
        }
    }
    serde_json::to_string(&Value::Object(map)).ok()
}

fn rewrite_path(url: &str, points: &[InjectionPoint], kind: PointKind, consumed: &mut [bool]) -> String {
    let Some((start, end)) = url_path_span(url) else {
        return url.to_string();
    };
    let mut segments: Vec<String> = url[start..end].split('/').map(|s| s.to_string()).collect();
    let mut changed = false;
    for (idx, point) in points.iter().enumerate() {
        if consumed[idx] || point.kind != kind {
            continue;
        }
        let Some(segment_index) = point
            .name
            .strip_prefix("path_")
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        if segments.get(segment_index).map(String::as_str) == Some(point.original_value.as_str()) {
            segments[segment_index] = point.placeholder.clone();
            consumed[idx] = true;
            changed = true;
        }
    }
    if !changed {
        return url.to_string();
    }
    format!("{}{}{}", &url[..start], segments.join("/"), &url[end..])
}

/// Absolute byte span of the path portion within the URL string.
fn url_path_span(url: &str) -> Option<(usize, usize)> {
    let end = url.find('?').unwrap_or(url.len());
    let authority_start = match url.find("://") {
        Some(idx) => idx + 3,
        None => 0,
    };
    let start = url[authority_start..end].find('/').map(|i| authority_start + i)?;
    Some((start, end))
}
