use super::{
    ClearConfirmations, ConfigurationRecord, SettingsForm, SettingsStore, StorageError,
    ValidationError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClearError {
    #[error("clear confirmation is unknown or expired")]
    UnknownConfirmation,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Handle returned by [`SettingsService::request_clear`].
#[derive(Debug, Clone)]
pub struct PendingClear {
    pub token: String,
    pub expires_in_seconds: i64,
}

/// Write side of the settings lifecycle: save and two-phase clear.
///
/// All writes go through `write_lock`, so a save and a confirmed clear never
/// interleave. Reads go straight to the store.
pub struct SettingsService {
    store: Arc<SettingsStore>,
    confirmations: ClearConfirmations,
    write_lock: Mutex<()>,
}

impl SettingsService {
    pub fn new(store: Arc<SettingsStore>, confirmations: ClearConfirmations) -> Self {
        Self {
            store,
            confirmations,
            write_lock: Mutex::new(()),
        }
    }

    pub fn confirmations(&self) -> &ClearConfirmations {
        &self.confirmations
    }

    /// Current record.
    pub fn current(&self) -> Result<ConfigurationRecord, StorageError> {
        self.store.get()
    }

    /// Editing session over the current record.
    pub fn form(&self) -> Result<SettingsForm, StorageError> {
        Ok(SettingsForm::from_record(&self.store.get()?))
    }

    fn serialize_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validates and stores a full field set.
    ///
    /// The submission is loaded into a [`SettingsForm`] and only persisted if
    /// the form can be saved. On rejection nothing is written and the previous
    /// record stays as is.
    pub fn save(&self, raw: &HashMap<String, String>) -> Result<ConfigurationRecord, SaveError> {
        let form = SettingsForm::from_fields(raw);
        if !form.can_save() {
            let missing = form.submit().err().map(|e| e.missing).unwrap_or_default();
            info!(state = ?form.state(), missing = ?missing, "Settings rejected");
            return Err(ValidationError { missing }.into());
        }
        let record = form.submit()?;

        {
            let _guard = self.serialize_writes();
            self.store.put(&record).map_err(|e| {
                warn!(error = %e, "Failed to store settings");
                e
            })?;
        }

        info!(
            model_id = %record.model_id,
            credential_set = record.has_credential(),
            "Settings saved"
        );

        Ok(record)
    }

    /// First step of clear-all. Storage is not touched.
    pub fn request_clear(&self) -> PendingClear {
        let token = self.confirmations.open();
        info!("Clear-all requested, awaiting confirmation");

        PendingClear {
            token,
            expires_in_seconds: self.confirmations.ttl().num_seconds(),
        }
    }

    /// Second step of clear-all: resets the record to defaults.
    pub fn confirm_clear(&self, token: &str) -> Result<(), ClearError> {
        let _guard = self.serialize_writes();

        if !self.confirmations.consume(token) {
            warn!("Clear-all confirmation rejected (unknown or expired)");
            return Err(ClearError::UnknownConfirmation);
        }

        self.store.delete().map_err(|e| {
            warn!(error = %e, "Failed to clear settings");
            e
        })?;

        info!("Settings cleared");
        Ok(())
    }

    /// Abandons a pending clear. Unknown tokens are accepted silently.
    pub fn cancel_clear(&self, token: &str) {
        if self.confirmations.discard(token) {
            info!("Clear-all cancelled");
        }
    }
}
