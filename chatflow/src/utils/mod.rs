//! Request validation and identifier helpers.

pub mod validation;

pub use validation::{parse_chat_body, validate_chat_body};

use uuid::Uuid;

/// Generates a time-ordered request identifier (UUID v7).
#[must_use]
pub fn generate_request_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_v7() {
        let id = generate_request_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_request_ids_are_ordered() {
        let first = generate_request_id();
        let second = generate_request_id();
        assert!(first <= second);
    }
}
