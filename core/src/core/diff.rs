use std::collections::HashMap;

/// Only the head of each body participates in the similarity signal; trailing
/// content on large pages adds cost without adding discrimination.
const SNIPPET_CHARS: usize = 4096;

/// Byte-length delta of the probed response against the baseline capture.
pub fn len_diff(response: &str, baseline: &str) -> i64 {
    response.len() as i64 - baseline.len() as i64
}

/// Similarity in `[0, 1]` between the first 4 KiB of baseline and response,
/// rounded to four decimals.
pub fn similarity(baseline: &str, response: &str) -> f64 {
    let ratio = quick_ratio(snippet(baseline), snippet(response));
    (ratio * 10_000.0).round() / 10_000.0
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Character-multiset overlap ratio: `2 * matches / (len_a + len_b)`. An
/// upper bound on a full sequence-match ratio, cheap enough to run on every
/// probe.
pub fn quick_ratio(a: &str, b: &str) -> f64 {
    let mut available: HashMap<char, usize> = HashMap::new();
    let mut len_b = 0usize;
    for c in b.chars() {
        *available.entry(c).or_insert(0) += 1;
        len_b += 1;
    }

    let mut matches = 0usize;
    let mut len_a = 0usize;
    for c in a.chars() {
        len_a += 1;
        if let Some(count) = available.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }

    if len_a + len_b == 0 {
        return 1.0;
    }
    2.0 * matches as f64 / (len_a + len_b) as f64
}
