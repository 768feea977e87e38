mod detector;
mod manager;
mod options;
mod site_url;

pub use detector::{
    BillingStatusReport, DetectorKind, RemoteStagingCheck, StagingDetector, compare_urls,
};
pub use manager::{ActionOutcome, StagingError, StagingManager, StagingStatus};
pub use options::{
    IGNORE_DUPLICATE_NOTICE_OPTION, JsonFileOptionStore, MemoryOptionStore, OptionChange,
    OptionStore, OptionStoreError, SITEURL_OPTION,
};
pub use site_url::{
    SITEURL_PLACEHOLDER, StoredUrlState, classify_stored_url, derive_staging_url, is_corrupted,
    parse_absolute_url, parse_canonical_url, sanitize_url, validate_custom_url,
};
