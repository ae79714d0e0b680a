//! JSON output formatting

use serde::Serialize;

/// Format a result as JSON
pub fn format_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|e| {
        format!(
            r#"{{"error": true, "code": "SERIALIZATION_ERROR", "message": "{}"}}"#,
            e
        )
    })
}

/// Format a result as compact JSON (single line), as used on stderr
pub fn format_json_compact<T: Serialize>(result: &T) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        format!(
            r#"{{"error": true, "code": "SERIALIZATION_ERROR", "message": "{}"}}"#,
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ConfigItemResult;

    #[test]
    fn test_config_item_json() {
        let item = ConfigItemResult {
            name: "linksize".to_string(),
            value: "2".to_string(),
            exit_code: 2,
        };
        let json = format_json(&item);
        assert!(json.contains("\"name\": \"linksize\""));
        assert!(json.contains("\"exit_code\": 2"));
        assert_eq!(
            format_json_compact(&item),
            r#"{"name":"linksize","value":"2","exit_code":2}"#
        );
    }
}
