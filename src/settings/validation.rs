use super::{ConfigurationRecord, Field, ModelId};
use std::collections::HashMap;

/// Rejection of a submitted field set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    /// Labels of the empty fields, in display order.
    pub missing: Vec<&'static str>,
}

/// Normalizes a submitted field map into a full record.
///
/// Normalization rules:
/// - credential: trimmed, otherwise untouched
/// - persona/avatar/voice: reduced to plain text by [`sanitize_text`]
/// - model: clamped to the allowed set (unknown values become the default)
///
/// Any field still empty afterwards is reported by label. Absent keys count
/// as empty.
pub fn validate(raw: &HashMap<String, String>) -> Result<ConfigurationRecord, ValidationError> {
    let get = |field: Field| raw.get(field.key()).map(String::as_str).unwrap_or("");

    let record = ConfigurationRecord::new(
        get(Field::Credential).trim(),
        sanitize_text(get(Field::PersonaId)),
        sanitize_text(get(Field::AvatarId)),
        sanitize_text(get(Field::VoiceId)),
        ModelId::clamp(get(Field::ModelId)),
    );

    let missing = record.missing_fields();
    if !missing.is_empty() {
        return Err(ValidationError { missing });
    }

    Ok(record)
}

/// Reduces free text to a single plain-text line.
///
/// Strips markup tags, drops control characters, collapses whitespace runs
/// into one space and trims the ends.
pub fn sanitize_text(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;

    for c in input.chars() {
        match c {
            // An unterminated '<' swallows the rest of the input
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            // Whitespace controls (tab, newline) become separators
            c if c.is_whitespace() => text.push(' '),
            c if c.is_control() => {}
            c => text.push(c),
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete_fields() -> HashMap<String, String> {
        fields(&[
            ("credential", "sk-123"),
            ("persona_id", "persona-1"),
            ("avatar_id", "avatar-1"),
            ("voice_id", "voice-1"),
            ("model_id", "ANAM_LLAMA_v3_3_70B_V1"),
        ])
    }

    #[test]
    fn test_valid_submission() {
        let record = validate(&complete_fields()).unwrap();
        assert_eq!(record.credential(), "sk-123");
        assert_eq!(record.persona_id, "persona-1");
        assert_eq!(record.avatar_id, "avatar-1");
        assert_eq!(record.voice_id, "voice-1");
        assert_eq!(record.model_id, ModelId::Llama70b);
        assert!(record.is_complete());
    }

    #[test]
    fn test_missing_persona_is_reported_by_label() {
        let raw = fields(&[
            ("credential", "abc"),
            ("persona_id", ""),
            ("avatar_id", "v1"),
            ("voice_id", "s1"),
            ("model_id", "bogus"),
        ]);

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.missing, vec!["Persona ID"]);
        assert_eq!(err.to_string(), "missing required fields: Persona ID");
    }

    #[test]
    fn test_unknown_model_is_clamped_not_rejected() {
        let mut raw = complete_fields();
        raw.insert("model_id".to_string(), "bogus".to_string());

        let record = validate(&raw).unwrap();
        assert_eq!(record.model_id, ModelId::default());
    }

    #[test]
    fn test_absent_model_uses_default() {
        let mut raw = complete_fields();
        raw.remove("model_id");

        assert_eq!(validate(&raw).unwrap().model_id, ModelId::default());
    }

    #[test]
    fn test_empty_map_lists_all_required_fields() {
        let err = validate(&HashMap::new()).unwrap_err();
        assert_eq!(
            err.missing,
            vec!["API Key", "Persona ID", "Avatar ID", "Voice ID"]
        );
    }

    #[test]
    fn test_whitespace_only_fields_are_missing() {
        let mut raw = complete_fields();
        raw.insert("credential".to_string(), "   ".to_string());
        raw.insert("voice_id".to_string(), "\t\n".to_string());

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.missing, vec!["API Key", "Voice ID"]);
    }

    #[test]
    fn test_credential_is_trimmed_only() {
        let mut raw = complete_fields();
        raw.insert("credential".to_string(), "  sk<with>odd chars  ".to_string());

        let record = validate(&raw).unwrap();
        assert_eq!(record.credential(), "sk<with>odd chars");
    }

    #[test]
    fn test_markup_only_identifier_is_missing() {
        let mut raw = complete_fields();
        raw.insert("avatar_id".to_string(), "<script></script>".to_string());

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.missing, vec!["Avatar ID"]);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut raw = complete_fields();
        raw.insert("debug_credential".to_string(), "leak".to_string());

        assert!(validate(&raw).is_ok());
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  persona-1  "), "persona-1");
        assert_eq!(sanitize_text("<b>persona</b>-1"), "persona-1");
        assert_eq!(sanitize_text("a\u{0}b\u{7}c"), "abc");
        assert_eq!(sanitize_text("line one\nline\ttwo"), "line one line two");
        assert_eq!(sanitize_text("id <unterminated"), "id");
        assert_eq!(sanitize_text("a > b"), "a > b");
    }
}
