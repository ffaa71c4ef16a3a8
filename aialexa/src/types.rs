//! Common identifier types.
//!
//! All entity IDs are UUIDs wrapped in type aliases so signatures say which entity they
//! refer to:
//!
//! - [`UserId`]: owner of files, chatbots and provider settings
//! - [`FileId`]: a stored (ingested) file
//! - [`UploadIntentId`]: an outbox record tracking one in-flight upload
//! - [`ChatbotId`]: a configured chatbot that can be embedded
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use uuid::Uuid;

pub type UserId = Uuid;
pub type FileId = Uuid;
pub type UploadIntentId = Uuid;
pub type ChatbotId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
