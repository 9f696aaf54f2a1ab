//! Editable view of the settings record.
//!
//! Mirrors what the settings page shows: dependent fields are locked until a
//! credential is typed in, and Save is only offered once every field would
//! validate.

use super::{sanitize_text, validate, ConfigurationRecord, Field, ModelId, ValidationError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Presentation state, derived from the current field values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    /// No credential; dependent fields locked.
    Empty,
    /// Credential set, at least one dependent field still empty.
    CredentialOnly,
    /// All five fields set.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{0} is locked until an API key is entered")]
    Locked(&'static str),
}

/// In-memory field values for one editing session.
#[derive(Clone, Default)]
pub struct SettingsForm {
    credential: String,
    persona_id: String,
    avatar_id: String,
    voice_id: String,
    model_id: ModelId,
}

impl SettingsForm {
    /// Starts a session from the stored record.
    pub fn from_record(record: &ConfigurationRecord) -> Self {
        Self {
            credential: record.credential().to_string(),
            persona_id: record.persona_id.clone(),
            avatar_id: record.avatar_id.clone(),
            voice_id: record.voice_id.clone(),
            model_id: record.model_id,
        }
    }

    /// Loads a submitted field map. Absent keys read as empty; the model is
    /// clamped. Dependent values are kept even while locked, so `can_save`
    /// sees exactly what was submitted.
    pub fn from_fields(raw: &HashMap<String, String>) -> Self {
        let get = |field: Field| raw.get(field.key()).cloned().unwrap_or_default();
        Self {
            credential: get(Field::Credential),
            persona_id: get(Field::PersonaId),
            avatar_id: get(Field::AvatarId),
            voice_id: get(Field::VoiceId),
            model_id: ModelId::clamp(&get(Field::ModelId)),
        }
    }

    pub fn state(&self) -> FormState {
        if self.credential.trim().is_empty() {
            FormState::Empty
        } else if self.dependents_set() {
            FormState::Complete
        } else {
            FormState::CredentialOnly
        }
    }

    fn dependents_set(&self) -> bool {
        [&self.persona_id, &self.avatar_id, &self.voice_id]
            .iter()
            .all(|v| !sanitize_text(v).is_empty())
    }

    /// Credential edits are always accepted; they lock or unlock the rest.
    ///
    /// Dependent values survive a lock so re-entering the key restores them.
    pub fn on_credential_change(&mut self, value: &str) -> FormState {
        self.credential = value.to_string();
        self.state()
    }

    pub fn is_editable(&self, field: Field) -> bool {
        !field.is_dependent() || self.state() != FormState::Empty
    }

    /// Editability of every field, keyed by field key.
    pub fn editable_fields(&self) -> HashMap<&'static str, bool> {
        Field::ALL
            .iter()
            .map(|f| (f.key(), self.is_editable(*f)))
            .collect()
    }

    /// Edits one field. Model values outside the allowed set are clamped.
    pub fn set_field(&mut self, field: Field, value: &str) -> Result<FormState, FormError> {
        if !self.is_editable(field) {
            return Err(FormError::Locked(field.label()));
        }

        match field {
            Field::Credential => return Ok(self.on_credential_change(value)),
            Field::PersonaId => self.persona_id = value.to_string(),
            Field::AvatarId => self.avatar_id = value.to_string(),
            Field::VoiceId => self.voice_id = value.to_string(),
            Field::ModelId => self.model_id = ModelId::clamp(value),
        }

        Ok(self.state())
    }

    /// Field map in the shape accepted by [`validate`].
    pub fn to_fields(&self) -> HashMap<String, String> {
        [
            (Field::Credential, self.credential.clone()),
            (Field::PersonaId, self.persona_id.clone()),
            (Field::AvatarId, self.avatar_id.clone()),
            (Field::VoiceId, self.voice_id.clone()),
            (Field::ModelId, self.model_id.as_str().to_string()),
        ]
        .into_iter()
        .map(|(f, v)| (f.key().to_string(), v))
        .collect()
    }

    /// True iff saving now would pass validation.
    pub fn can_save(&self) -> bool {
        self.state() != FormState::Empty && self.submit().is_ok()
    }

    /// Normalized record for persisting, or the labels still missing.
    pub fn submit(&self) -> Result<ConfigurationRecord, ValidationError> {
        validate(&self.to_fields())
    }
}

impl fmt::Debug for SettingsForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsForm")
            .field("state", &self.state())
            .field("persona_id", &self.persona_id)
            .field("avatar_id", &self.avatar_id)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}
