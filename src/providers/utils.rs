use serde_json::Value;
use crate::providers::traits::ProviderError;

/// Joins the text parts of the first candidate in a generateContent response.
pub fn extract_candidate_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn parse_embedding_values(embedding: &Value) -> Result<Vec<f32>, ProviderError> {
    let values = embedding["values"]
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("missing embedding values".to_string()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("non-numeric embedding value: {}", v)))
        })
        .collect()
}

/// Pulls `error.message` out of an error body, falling back to the raw text.
pub fn extract_api_error(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Key Insight: " }, { "text": "yes" }] }
            }]
        });
        assert_eq!(extract_candidate_text(&response).as_deref(), Some("Key Insight: yes"));
    }

    #[test]
    fn test_candidate_text_missing_or_blank() {
        assert!(extract_candidate_text(&json!({ "candidates": [] })).is_none());
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(extract_candidate_text(&blank).is_none());
    }

    #[test]
    fn test_embedding_values() {
        let values = parse_embedding_values(&json!({ "values": [0.5, -1.0, 2] })).unwrap();
        assert_eq!(values, vec![0.5, -1.0, 2.0]);

        assert!(parse_embedding_values(&json!({ "values": ["x"] })).is_err());
        assert!(parse_embedding_values(&json!({})).is_err());
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid"}}"#;
        assert_eq!(extract_api_error(body), "API key not valid");
        assert_eq!(extract_api_error("  gateway timeout "), "gateway timeout");
    }
}
