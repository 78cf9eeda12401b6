/// How a JSON document was located in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The whole trimmed text.
    Bare,
    /// A ```json fenced block.
    JsonFence,
    /// Any fenced block.
    AnyFence,
    /// Bracket-balanced scan from the first `{` or `[`.
    Balanced,
    /// First opening to last closing bracket.
    Outermost,
}

/// Result of looking for JSON in raw model text.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found { json_text: String, strategy: Strategy },
    /// Something JSON-shaped was located but none of it parses.
    Malformed { candidate: String, error: String },
    NotFound { reason: String },
}

#[cfg(test)]
impl Extraction {
    pub fn json_text(&self) -> Option<&str> {
        match self {
            Extraction::Found { json_text, .. } => Some(json_text),
            _ => None,
        }
    }
}

/// Locate a JSON document in model output. The first candidate that parses wins.
pub fn extract(raw: &str) -> Extraction {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Extraction::NotFound {
            reason: "model output is empty".to_string(),
        };
    }

    let mut candidates: Vec<(Strategy, &str)> = Vec::new();
    if is_bracketed(trimmed) {
        candidates.push((Strategy::Bare, trimmed));
    }
    if let Some(block) = json_fence(trimmed) {
        candidates.push((Strategy::JsonFence, block));
    }
    candidates.extend(fenced_blocks(trimmed).into_iter().map(|b| (Strategy::AnyFence, b)));
    if let Some(slice) = balanced_slice(trimmed) {
        candidates.push((Strategy::Balanced, slice));
    }
    if let Some(slice) = outermost_slice(trimmed) {
        candidates.push((Strategy::Outermost, slice));
    }

    let mut first_error: Option<(String, String)> = None;
    for (strategy, candidate) in candidates {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(candidate) {
            Ok(_) => {
                return Extraction::Found {
                    json_text: candidate.to_string(),
                    strategy,
                }
            }
            Err(e) => {
                if first_error.is_none() && is_bracketed(candidate) {
                    first_error = Some((candidate.to_string(), e.to_string()));
                }
            }
        }
    }

    match first_error {
        Some((candidate, error)) => Extraction::Malformed { candidate, error },
        None => Extraction::NotFound {
            reason: "no JSON object or array in model output".to_string(),
        },
    }
}

fn is_bracketed(s: &str) -> bool {
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

/// Content of the first ```json block.
fn json_fence(input: &str) -> Option<&str> {
    let lower = input.to_ascii_lowercase();
    let idx = lower.find("```json")?;
    let after_tag = &input[idx + 7..];
    let body_start = after_tag.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_tag[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

/// Contents of every fenced block, whatever its info string.
fn fenced_blocks(input: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = input;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string on the opening line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

/// Slice from the first `{` or `[` to its matching close, skipping brackets
/// inside string literals.
fn balanced_slice(input: &str) -> Option<&str> {
    let start = input.find(['{', '['])?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn outermost_slice(input: &str) -> Option<&str> {
    let pairs = [('{', '}'), ('[', ']')];
    pairs
        .iter()
        .filter_map(|(open, close)| {
            let start = input.find(*open)?;
            let end = input.rfind(*close)?;
            (end > start).then(|| &input[start..=end])
        })
        .min_by_key(|slice| input.len() - slice.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(raw: &str) -> (String, Strategy) {
        match extract(raw) {
            Extraction::Found {
                json_text,
                strategy,
            } => (json_text, strategy),
            other => panic!("expected JSON, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_json() {
        let (text, strategy) = found("  {\"a\": 1}\n");
        assert_eq!(text, "{\"a\": 1}");
        assert_eq!(strategy, Strategy::Bare);
    }

    #[test]
    fn test_json_fence_in_prose() {
        let raw = "Here is the answer:\n```json\n{\"mode\": \"spec_writer\"}\n```\nHope this helps.";
        let (text, strategy) = found(raw);
        assert_eq!(text, "{\"mode\": \"spec_writer\"}");
        assert_eq!(strategy, Strategy::JsonFence);
    }

    #[test]
    fn test_untagged_fence_skips_non_json_block() {
        let raw = "```text\nnot json\n```\nand\n```\n[1, 2]\n```";
        let (text, strategy) = found(raw);
        assert_eq!(text, "[1, 2]");
        assert_eq!(strategy, Strategy::AnyFence);
    }

    #[test]
    fn test_balanced_scan_ignores_braces_in_strings() {
        let raw = "Sure! {\"summary\": \"use } carefully\", \"n\": {\"x\": 1}} trailing } text";
        let (text, strategy) = found(raw);
        assert_eq!(text, "{\"summary\": \"use } carefully\", \"n\": {\"x\": 1}}");
        assert_eq!(strategy, Strategy::Balanced);
    }

    #[test]
    fn test_outermost_pair_last_resort() {
        // The balanced scan starts at the `[` of a prose tag and yields "[note]".
        let (text, strategy) = found("[note] {\"a\": 1}");
        assert_eq!(text, "{\"a\": 1}");
        assert_eq!(strategy, Strategy::Outermost);
    }

    #[test]
    fn test_no_json() {
        assert!(matches!(
            extract("I cannot answer that."),
            Extraction::NotFound { .. }
        ));
        assert!(matches!(extract("   "), Extraction::NotFound { .. }));
        assert_eq!(extract("plain").json_text(), None);
    }

    #[test]
    fn test_malformed_json() {
        let result = extract("{\"summary\": \"unterminated}");
        assert!(matches!(result, Extraction::Malformed { .. }));
    }

    #[test]
    fn test_idempotent_on_bare_json() {
        let raw = "{\"schemaVersion\": \"v0.1\", \"data\": {\"questions\": [\"Where?\"]}}";
        let first = extract(raw);
        let again = extract(first.json_text().unwrap());
        assert_eq!(first, again);
    }
}
