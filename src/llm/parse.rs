use serde::de::DeserializeOwned;

/// Decode a JSON object from free-form model output.
///
/// Markdown fences are stripped, then the span from the first `{` to the last
/// `}` is decoded strictly into `T`. Anything outside that span is ignored.
pub fn parse_json_payload<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let unfenced = strip_fences(text);
    let start = unfenced
        .find('{')
        .ok_or_else(|| "no JSON object in model output".to_string())?;
    let end = unfenced
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| "unterminated JSON object in model output".to_string())?;

    serde_json::from_str(&unfenced[start..=end]).map_err(|e| format!("invalid JSON payload: {e}"))
}

/// Decode the latest text segment that holds a `T`, walking back from the
/// last one. Earlier segments are usually narration around tool calls. On
/// failure the error for the last segment is returned.
pub fn parse_latest_payload<T, S>(segments: &[S]) -> Result<T, String>
where
    T: DeserializeOwned,
    S: AsRef<str>,
{
    let mut last_error = None;
    for segment in segments.iter().rev() {
        match parse_json_payload(segment.as_ref()) {
            Ok(payload) => return Ok(payload),
            Err(e) => {
                last_error.get_or_insert(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| "model output contained no text".to_string()))
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
