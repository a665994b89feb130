//! Validation of inbound chat bodies.
//!
//! Everything here runs before a request context exists; a failure never
//! enters the pipeline and maps straight to VALIDATION_FAILED/400.

use crate::config::LimitsConfig;
use crate::context::ChatBody;
use crate::errors::PipelineError;
use crate::observability::sanitize_for_log;

/// Parses and validates a raw request body.
pub fn parse_chat_body(bytes: &[u8], limits: &LimitsConfig) -> Result<ChatBody, PipelineError> {
    if bytes.len() > limits.max_request_bytes {
        return Err(PipelineError::validation(format!(
            "Request body of {} bytes exceeds the {} byte limit",
            bytes.len(),
            limits.max_request_bytes
        ))
        .with_metadata("maxRequestBytes", limits.max_request_bytes));
    }

    let body: ChatBody = serde_json::from_slice(bytes).map_err(|err| {
        PipelineError::validation(format!(
            "Invalid request body: {}",
            sanitize_for_log(&err.to_string())
        ))
    })?;

    validate_chat_body(&body, limits)?;
    Ok(body)
}

/// Validates a parsed chat body against the configured limits.
pub fn validate_chat_body(body: &ChatBody, limits: &LimitsConfig) -> Result<(), PipelineError> {
    match &body.model {
        None => return Err(PipelineError::validation("Missing required field: model")),
        Some(model) if model.id.trim().is_empty() => {
            return Err(PipelineError::validation("model.id must not be empty"));
        }
        Some(_) => {}
    }

    if body.messages.is_empty() {
        return Err(PipelineError::validation("messages must contain at least one message"));
    }

    if let Some(temperature) = body.temperature {
        if !temperature.is_finite()
            || temperature < limits.min_temperature
            || temperature > limits.max_temperature
        {
            return Err(PipelineError::validation(format!(
                "temperature must be between {} and {}",
                limits.min_temperature, limits.max_temperature
            ))
            .with_metadata("temperature", temperature));
        }
    }

    for (index, message) in body.messages.iter().enumerate() {
        let size = serde_json::to_vec(message)
            .map_err(|err| PipelineError::validation(format!("messages[{index}] is not serializable: {err}")))?
            .len();
        if size > limits.max_message_bytes {
            return Err(PipelineError::validation(format!(
                "messages[{index}] is {size} bytes, exceeding the {} byte limit",
                limits.max_message_bytes
            ))
            .with_metadata("messageIndex", index)
            .with_metadata("maxMessageBytes", limits.max_message_bytes));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChatMessage;
    use crate::errors::ErrorCode;

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn valid_body() -> ChatBody {
        ChatBody::new("gpt-4o", vec![ChatMessage::user("hello")])
    }

    #[test]
    fn test_valid_body_passes() {
        assert!(validate_chat_body(&valid_body(), &limits()).is_ok());
    }

    #[test]
    fn test_missing_model() {
        let mut body = valid_body();
        body.model = None;
        let err = validate_chat_body(&body, &limits()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("model"));
    }

    #[test]
    fn test_empty_messages() {
        let mut body = valid_body();
        body.messages.clear();
        let err = validate_chat_body(&body, &limits()).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_temperature_bounds() {
        for temperature in [-0.1, 2.1, f64::NAN] {
            let body = valid_body().with_temperature(temperature);
            assert!(validate_chat_body(&body, &limits()).is_err(), "{temperature} accepted");
        }
        for temperature in [0.0, 1.0, 2.0] {
            let body = valid_body().with_temperature(temperature);
            assert!(validate_chat_body(&body, &limits()).is_ok(), "{temperature} rejected");
        }
    }

    #[test]
    fn test_oversized_message() {
        let body = ChatBody::new("m", vec![ChatMessage::user("x".repeat(10 * 1024 * 1024 + 1))]);
        let err = validate_chat_body(&body, &limits()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.metadata["messageIndex"], serde_json::json!(0));
    }

    #[test]
    fn test_parse_invalid_role() {
        let raw = br#"{"model": {"id": "m"}, "messages": [{"role": "robot", "content": "hi"}]}"#;
        let err = parse_chat_body(raw, &limits()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.starts_with("Invalid request body"));
    }

    #[test]
    fn test_parse_rejects_oversized_body() {
        let limits = LimitsConfig {
            max_request_bytes: 8,
            ..LimitsConfig::default()
        };
        let err = parse_chat_body(br#"{"model": null}"#, &limits).unwrap_err();
        assert!(err.message.contains("exceeds"));
    }
}
