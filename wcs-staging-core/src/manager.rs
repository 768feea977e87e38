use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    detector::{DetectorKind, StagingDetector},
    options::{
        IGNORE_DUPLICATE_NOTICE_OPTION, OptionChange, OptionStore, OptionStoreError,
        SITEURL_OPTION,
    },
    site_url::{
        StoredUrlState, classify_stored_url, derive_staging_url, is_corrupted, validate_custom_url,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagingStatus {
    pub is_staging: bool,
    pub stored_url: Option<String>,
    pub canonical_url: String,
    pub urls_match: bool,
    pub stored_state: StoredUrlState,
    pub detector: DetectorKind,
}

impl StagingStatus {
    pub fn is_corrupted(&self) -> bool {
        self.stored_state == StoredUrlState::Corrupted
    }
}

/// What a mutation did. Each outcome maps to the one-shot indicator the
/// admin page reads after its redirect.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    LiveEnabled,
    StagingEnabled,
    UrlUpdated,
    Repaired,
    InvalidUrl,
}

impl ActionOutcome {
    pub fn query_pair(self) -> (&'static str, &'static str) {
        match self {
            ActionOutcome::LiveEnabled => ("mode", "live"),
            ActionOutcome::StagingEnabled => ("mode", "staging"),
            ActionOutcome::UrlUpdated => ("updated", "1"),
            ActionOutcome::Repaired => ("repaired", "1"),
            ActionOutcome::InvalidUrl => ("error", "invalid_url"),
        }
    }

    pub fn from_query_pair(key: &str, value: &str) -> Option<ActionOutcome> {
        match (key, value) {
            ("mode", "live") => Some(ActionOutcome::LiveEnabled),
            ("mode", "staging") => Some(ActionOutcome::StagingEnabled),
            ("updated", _) => Some(ActionOutcome::UrlUpdated),
            ("repaired", _) => Some(ActionOutcome::Repaired),
            ("error", "invalid_url") => Some(ActionOutcome::InvalidUrl),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, ActionOutcome::InvalidUrl)
    }

    pub fn notice(self) -> &'static str {
        match self {
            ActionOutcome::LiveEnabled => "Live mode enabled! Automatic payments are now active.",
            ActionOutcome::StagingEnabled => {
                "Staging mode enabled! Automatic payments are now disabled."
            }
            ActionOutcome::UrlUpdated => "URL updated successfully!",
            ActionOutcome::Repaired => "Stored URL repaired.",
            ActionOutcome::InvalidUrl => "The URL you entered is not a valid absolute URL.",
        }
    }
}

#[derive(Debug)]
pub enum StagingError {
    Storage {
        operation: &'static str,
        source: OptionStoreError,
    },
}

impl std::fmt::Display for StagingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingError::Storage { operation, source } => {
                write!(f, "{operation} failed: {source}")
            }
        }
    }
}

impl std::error::Error for StagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StagingError::Storage { source, .. } => Some(source),
        }
    }
}

#[derive(Clone)]
pub struct StagingManager {
    store: Arc<dyn OptionStore>,
    detector: StagingDetector,
    canonical_url: String,
}

impl StagingManager {
    pub fn new(
        store: Arc<dyn OptionStore>,
        detector: StagingDetector,
        canonical_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            detector,
            canonical_url: canonical_url.into(),
        }
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn detector_kind(&self) -> DetectorKind {
        self.detector.kind()
    }

    /// Reads the current stored value. The cache is flushed first because
    /// the billing system writes the same key.
    pub fn stored_url(&self) -> Result<Option<String>, StagingError> {
        self.store
            .flush_cache()
            .and_then(|()| self.store.get(SITEURL_OPTION))
            .map_err(|source| self.storage_failure("read stored site url", source))
    }

    pub async fn status(&self) -> Result<StagingStatus, StagingError> {
        let stored_url = self.stored_url()?.filter(|value| !value.is_empty());
        let is_staging = self
            .detector
            .is_staging(stored_url.as_deref(), &self.canonical_url)
            .await;
        Ok(StagingStatus {
            is_staging,
            urls_match: stored_url.as_deref() == Some(self.canonical_url.as_str()),
            stored_state: classify_stored_url(stored_url.as_deref()),
            stored_url,
            canonical_url: self.canonical_url.clone(),
            detector: self.detector.kind(),
        })
    }

    pub fn set_live_mode(&self) -> Result<ActionOutcome, StagingError> {
        self.write_site_url("enable live mode", &self.canonical_url)?;
        info!("live mode enabled site_url={}", self.canonical_url);
        Ok(ActionOutcome::LiveEnabled)
    }

    pub fn set_staging_mode(&self) -> Result<ActionOutcome, StagingError> {
        let staging_url = derive_staging_url(&self.canonical_url);
        self.write_site_url("enable staging mode", &staging_url)?;
        info!("staging mode enabled site_url={staging_url}");
        Ok(ActionOutcome::StagingEnabled)
    }

    pub fn set_custom_url(&self, candidate: &str) -> Result<ActionOutcome, StagingError> {
        let Some(sanitized) = validate_custom_url(candidate) else {
            warn!("rejected custom site url candidate={candidate:?}");
            return Ok(ActionOutcome::InvalidUrl);
        };
        self.write_site_url("update site url", &sanitized)?;
        info!("site url updated site_url={sanitized}");
        Ok(ActionOutcome::UrlUpdated)
    }

    pub fn repair_corrupted_url(&self) -> Result<ActionOutcome, StagingError> {
        let previous = self.stored_url()?;
        if !previous.as_deref().is_some_and(is_corrupted) {
            info!("repair requested for a stored url that is not corrupted");
        }
        self.store
            .apply(&[
                OptionChange::Delete { key: SITEURL_OPTION },
                OptionChange::Set {
                    key: SITEURL_OPTION,
                    value: &self.canonical_url,
                },
                OptionChange::Delete {
                    key: IGNORE_DUPLICATE_NOTICE_OPTION,
                },
            ])
            .map_err(|source| self.storage_failure("repair site url", source))?;
        info!(
            "stored site url repaired previous={:?} site_url={}",
            previous, self.canonical_url
        );
        Ok(ActionOutcome::Repaired)
    }

    /// Stores `value` and clears the dismissed-notice flag in one write.
    fn write_site_url(&self, operation: &'static str, value: &str) -> Result<(), StagingError> {
        self.store
            .apply(&[
                OptionChange::Set {
                    key: SITEURL_OPTION,
                    value,
                },
                OptionChange::Delete {
                    key: IGNORE_DUPLICATE_NOTICE_OPTION,
                },
            ])
            .map_err(|source| self.storage_failure(operation, source))
    }

    fn storage_failure(&self, operation: &'static str, source: OptionStoreError) -> StagingError {
        error!("{operation} failed: {source}");
        StagingError::Storage { operation, source }
    }
}
