use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Body served by the billing system's staging status endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingStatusReport {
    pub is_duplicate_site: bool,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Authoritative,
    Fallback,
}

#[derive(Clone, Debug)]
pub struct RemoteStagingCheck {
    client: reqwest::Client,
    status_url: String,
}

impl RemoteStagingCheck {
    pub fn new(status_url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("failed to build billing status client: {err}"))?;
        Ok(Self {
            client,
            status_url: status_url.into(),
        })
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub async fn fetch(&self) -> Result<BillingStatusReport, String> {
        let response = self
            .client
            .get(&self.status_url)
            .send()
            .await
            .map_err(|err| format!("billing status request failed: {err}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("billing status endpoint answered {status}"));
        }
        response
            .json::<BillingStatusReport>()
            .await
            .map_err(|err| format!("billing status body could not be decoded: {err}"))
    }
}

/// Decides staging mode. Picked once at startup; the authoritative variant
/// wraps the billing system's own check, the fallback compares strings.
#[derive(Clone, Debug)]
pub enum StagingDetector {
    Authoritative(RemoteStagingCheck),
    Fallback,
}

impl StagingDetector {
    /// Probes the billing system's status endpoint once. Any failure selects
    /// the fallback comparator. Also returns the library version the
    /// endpoint reported, if any.
    pub async fn probe(
        status_url: Option<&str>,
        timeout: Duration,
    ) -> (StagingDetector, Option<String>) {
        let Some(status_url) = status_url.map(str::trim).filter(|url| !url.is_empty()) else {
            info!("no billing status endpoint configured; comparing urls locally");
            return (StagingDetector::Fallback, None);
        };
        let check = match RemoteStagingCheck::new(status_url, timeout) {
            Ok(check) => check,
            Err(err) => {
                warn!("{err}; comparing urls locally");
                return (StagingDetector::Fallback, None);
            }
        };
        match check.fetch().await {
            Ok(report) => {
                info!(
                    "billing status endpoint detected url={} version={}",
                    status_url,
                    report.version.as_deref().unwrap_or("unknown")
                );
                (StagingDetector::Authoritative(check), report.version)
            }
            Err(err) => {
                warn!("billing status probe failed url={status_url} err={err}; comparing urls locally");
                (StagingDetector::Fallback, None)
            }
        }
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            StagingDetector::Authoritative(_) => DetectorKind::Authoritative,
            StagingDetector::Fallback => DetectorKind::Fallback,
        }
    }

    pub async fn is_staging(&self, stored: Option<&str>, canonical: &str) -> bool {
        match self {
            StagingDetector::Authoritative(check) => match check.fetch().await {
                Ok(report) => report.is_duplicate_site,
                Err(err) => {
                    warn!(
                        "authoritative staging check failed url={} err={err}; using local comparison",
                        check.status_url()
                    );
                    compare_urls(stored, canonical)
                }
            },
            StagingDetector::Fallback => compare_urls(stored, canonical),
        }
    }
}

/// An unset stored value never counts as divergent.
pub fn compare_urls(stored: Option<&str>, canonical: &str) -> bool {
    match stored {
        Some(value) if !value.is_empty() => value != canonical,
        _ => false,
    }
}
