const OPEN_TAG: &str = "<return_value>\n";
const CLOSE_TAG: &str = "\n</return_value>";

/// Extracts the programmatic return value from a code-execution payload.
///
/// The Python runner reports printed output and the value of the last
/// expression separately, the latter wrapped as
/// `<return_value>\n...\n</return_value>`. This returns the wrapped text when
/// such a non-empty region exists, and the whole payload otherwise.
pub fn extract_return_value(payload: &str) -> &str {
    let Some(start) = payload.find(OPEN_TAG) else {
        return payload;
    };
    let body = &payload[start + OPEN_TAG.len()..];
    match body.find(CLOSE_TAG) {
        Some(end) if end > 0 => &body[..end],
        _ => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_present() {
        let payload = "<status>success</status>\n<output>\nhi\n</output>\n\
                       <return_value>\n[1, 2]\n</return_value>";
        assert_eq!(extract_return_value(payload), "[1, 2]");
    }

    #[test]
    fn test_multiline_region_stops_at_first_close() {
        let payload = "<return_value>\na\nb\n</return_value>\n\
                       <return_value>\nc\n</return_value>";
        assert_eq!(extract_return_value(payload), "a\nb");
    }

    #[test]
    fn test_fallback_to_payload() {
        assert_eq!(extract_return_value("4"), "4");

        let unterminated = "<return_value>\n42";
        assert_eq!(extract_return_value(unterminated), unterminated);

        let empty = "<return_value>\n\n</return_value>";
        assert_eq!(extract_return_value(empty), empty);

        let inline = "<return_value>42</return_value>";
        assert_eq!(extract_return_value(inline), inline);
    }
}
