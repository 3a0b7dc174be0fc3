//! Pulling JSON out of model text.

/// The first JSON object or array in `text`.
///
/// Accepts a bare JSON document or the body of a fenced ```json block.
/// Scalars are ignored: a model answering `42` has no structured payload.
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Some(value) = parse_structured(trimmed) {
        return Some(value);
    }
    fenced_blocks(trimmed).find_map(parse_structured)
}

fn parse_structured(text: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(text.trim()) {
        Ok(v) if v.is_object() || v.is_array() => Some(v),
        _ => None,
    }
}

/// Bodies of ```json (or bare ```) fenced blocks, in order.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```")
        .skip(1)
        .step_by(2)
        .map(|block| block.strip_prefix("json").unwrap_or(block))
}

/// `text` with one surrounding code fence removed, if present.
pub(crate) fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    fenced_blocks(trimmed)
        .next()
        .map(str::trim)
        .unwrap_or(trimmed)
}
