use serde_json::{json, Value};

/// Builds a standardized tool error body: a short human-readable message on
/// the first line, then a JSON object with `code`, `message` and `details`.
pub fn build_error_payload(code: &str, message: &str, details: Value) -> String {
    let obj = json!({
        "code": code,
        "message": message,
        "details": details,
    });
    format!("{}\n{}", message, obj)
}

/// Reads the `code` back out of a payload built by [`build_error_payload`].
pub fn payload_code(payload: &str) -> Option<String> {
    let json_line = payload
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))?;
    serde_json::from_str::<Value>(json_line)
        .ok()?
        .get("code")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_message_line_then_json() {
        let payload = build_error_payload(
            "ERR_INPUT_INVALID_PATTERN",
            "item pattern is empty",
            json!({ "itemFormat": "" }),
        );
        let mut lines = payload.lines();
        assert_eq!(lines.next(), Some("item pattern is empty"));
        let body: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(body["details"]["itemFormat"], "");
        assert_eq!(payload_code(&payload).as_deref(), Some("ERR_INPUT_INVALID_PATTERN"));
    }

    #[test]
    fn plain_text_has_no_code() {
        assert_eq!(payload_code("something went wrong"), None);
    }
}
