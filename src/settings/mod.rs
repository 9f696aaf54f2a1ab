//! Operator settings: the single configuration record and its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SettingsService                    │
//! │  - save (validate, full replace)         │
//! │  - two-phase clear (request/confirm)     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (validate)            (derive state)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │  validation        │  SettingsForm       │
//! │  - sanitize fields │  - field gating     │
//! │  - clamp model     │  - can_save         │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       SettingsStore (SQLite)             │
//! │  - one row, credential sealed at rest    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Completeness is always derived from the record's fields. Nothing in this
//! module stores a "complete" flag.

use serde::{Deserialize, Serialize};
use std::fmt;

mod confirmations;
mod encryption;
mod form;
mod service;
mod store;
mod validation;

pub use confirmations::{run_confirmation_cleanup, ClearConfirmations};
pub use encryption::SealingKey;
pub use form::{FormError, FormState, SettingsForm};
pub use service::{ClearError, PendingClear, SaveError, SettingsService};
pub use store::{SettingsStore, StorageError};
pub use validation::{sanitize_text, validate, ValidationError};

/// Model selector accepted by the upstream platform.
///
/// The set is closed. Unknown wire values are never an error: they collapse
/// to [`ModelId::default`] through [`ModelId::clamp`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "ANAM_GPT_4O_MINI_V1")]
    Gpt4oMini,
    #[serde(rename = "ANAM_LLAMA_v3_3_70B_V1")]
    Llama70b,
    #[serde(rename = "ANAM_GEMINI_2_5_FLASH_V1")]
    Gemini25Flash,
    #[serde(rename = "CUSTOMER_CLIENT_V1")]
    CustomerClient,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::Gpt4oMini,
        ModelId::Llama70b,
        ModelId::Gemini25Flash,
        ModelId::CustomerClient,
    ];

    /// Identifier sent upstream and stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt4oMini => "ANAM_GPT_4O_MINI_V1",
            ModelId::Llama70b => "ANAM_LLAMA_v3_3_70B_V1",
            ModelId::Gemini25Flash => "ANAM_GEMINI_2_5_FLASH_V1",
            ModelId::CustomerClient => "CUSTOMER_CLIENT_V1",
        }
    }

    /// Human-readable name for selection lists.
    pub fn label(&self) -> &'static str {
        match self {
            ModelId::Gpt4oMini => "GPT-4o mini",
            ModelId::Llama70b => "Llama 3.3 70B",
            ModelId::Gemini25Flash => "Gemini 2.5 Flash",
            ModelId::CustomerClient => "Client-side LLM",
        }
    }

    /// Exact-match lookup. Returns `None` for anything outside the set.
    pub fn parse(value: &str) -> Option<ModelId> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }

    /// Maps any input onto the allowed set, substituting the default.
    pub fn clamp(value: &str) -> ModelId {
        Self::parse(value.trim()).unwrap_or_default()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five settings fields, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Credential,
    PersonaId,
    AvatarId,
    VoiceId,
    ModelId,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Credential,
        Field::PersonaId,
        Field::AvatarId,
        Field::VoiceId,
        Field::ModelId,
    ];

    /// Fields that only make sense once a credential is set.
    pub const DEPENDENT: [Field; 4] = [
        Field::PersonaId,
        Field::AvatarId,
        Field::VoiceId,
        Field::ModelId,
    ];

    /// Key used in submitted field maps.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Credential => "credential",
            Field::PersonaId => "persona_id",
            Field::AvatarId => "avatar_id",
            Field::VoiceId => "voice_id",
            Field::ModelId => "model_id",
        }
    }

    /// Label reported back in validation rejections.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Credential => "API Key",
            Field::PersonaId => "Persona ID",
            Field::AvatarId => "Avatar ID",
            Field::VoiceId => "Voice ID",
            Field::ModelId => "Model",
        }
    }

    pub fn is_dependent(&self) -> bool {
        !matches!(self, Field::Credential)
    }
}

/// The single persisted settings record.
///
/// # Security
/// - The credential is only readable inside this crate
/// - `Debug` output redacts it
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigurationRecord {
    credential: String,
    pub persona_id: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub model_id: ModelId,
}

impl ConfigurationRecord {
    pub fn new(
        credential: impl Into<String>,
        persona_id: impl Into<String>,
        avatar_id: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: ModelId,
    ) -> Self {
        Self {
            credential: credential.into(),
            persona_id: persona_id.into(),
            avatar_id: avatar_id.into(),
            voice_id: voice_id.into(),
            model_id,
        }
    }

    /// Raw credential. Only the store and the broker read this.
    pub(crate) fn credential(&self) -> &str {
        &self.credential
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    /// Value of a field as submitted/stored text.
    pub(crate) fn value(&self, field: Field) -> &str {
        match field {
            Field::Credential => &self.credential,
            Field::PersonaId => &self.persona_id,
            Field::AvatarId => &self.avatar_id,
            Field::VoiceId => &self.voice_id,
            Field::ModelId => self.model_id.as_str(),
        }
    }

    /// Labels of fields that are currently empty, in display order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        Field::ALL
            .iter()
            .filter(|f| self.value(**f).is_empty())
            .map(|f| f.label())
            .collect()
    }

    /// True iff all five fields are set.
    pub fn is_complete(&self) -> bool {
        Field::ALL.iter().all(|f| !self.value(*f).is_empty())
    }
}

impl fmt::Debug for ConfigurationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationRecord")
            .field("credential", &if self.has_credential() { "[redacted]" } else { "" })
            .field("persona_id", &self.persona_id)
            .field("avatar_id", &self.avatar_id)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish()
    }
}
