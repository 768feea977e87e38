use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Json, Router,
    extract::{Form, Query, Request, State},
    http::{
        HeaderMap, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE},
    },
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use staging_core::{
    ActionOutcome, DetectorKind, JsonFileOptionStore, MemoryOptionStore, OptionStore,
    StagingDetector, StagingError, StagingManager, StagingStatus, StoredUrlState,
    classify_stored_url,
};
use tracing::{error, info, warn};

use crate::{
    auth::AdminAuth,
    config::{ControllerConfig, version_text},
    logging::{
        category_access, category_auth, category_mode, category_store, method_label, status_label,
    },
    nonce::{NONCE_ACTION, NonceError, NonceRegistry},
    render,
};

mod handlers;

use handlers::*;

/// Fixed page identifier of the admin screen.
pub const ADMIN_PAGE_PATH: &str = "/admin/wcs-staging-controller";
pub const LOGIN_PATH: &str = "/login";

#[derive(Clone)]
pub struct ControllerState {
    manager: StagingManager,
    auth: Arc<AdminAuth>,
    nonces: Arc<NonceRegistry>,
    metrics: Arc<ControllerMetrics>,
    environment: Arc<HostEnvironment>,
}

/// What the controller knows about the billing system it sits next to.
#[derive(Clone, Debug)]
pub struct HostEnvironment {
    pub billing_active: bool,
    pub billing_version: Option<String>,
}

struct ControllerMetrics {
    started_at: Instant,
    page_views_total: AtomicU64,
    status_reads_total: AtomicU64,
    mutations_applied_total: AtomicU64,
    mutations_rejected_total: AtomicU64,
    mutations_failed_total: AtomicU64,
    auth_failures_total: AtomicU64,
    nonce_failures_total: AtomicU64,
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            page_views_total: AtomicU64::new(0),
            status_reads_total: AtomicU64::new(0),
            mutations_applied_total: AtomicU64::new(0),
            mutations_rejected_total: AtomicU64::new(0),
            mutations_failed_total: AtomicU64::new(0),
            auth_failures_total: AtomicU64::new(0),
            nonce_failures_total: AtomicU64::new(0),
        }
    }
}

impl ControllerState {
    pub fn new(
        config: &ControllerConfig,
        store: Arc<dyn OptionStore>,
        detector: StagingDetector,
        auth: AdminAuth,
    ) -> Self {
        Self {
            manager: StagingManager::new(store, detector, config.site_url.clone()),
            auth: Arc::new(auth.with_secure_cookies(config.site_url.starts_with("https://"))),
            nonces: Arc::new(NonceRegistry::new(Duration::from_secs(config.nonce_ttl_secs))),
            metrics: Arc::new(ControllerMetrics::default()),
            environment: Arc::new(HostEnvironment {
                billing_active: config.billing_active,
                billing_version: config.billing_version.clone(),
            }),
        }
    }

    /// Opens the option store and probes the billing system once.
    pub async fn bootstrap(config: &ControllerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn OptionStore> = match config.options_path.as_deref() {
            Some(path) => {
                let store = JsonFileOptionStore::open(path)?;
                info!("{} options loaded path={}", category_store(), path.display());
                Arc::new(store)
            }
            None => {
                warn!(
                    "{} options are kept in memory and will be lost on exit",
                    category_store()
                );
                Arc::new(MemoryOptionStore::new())
            }
        };

        let (detector, reported_version) = if config.billing_active {
            StagingDetector::probe(
                config.billing_status_url.as_deref(),
                Duration::from_millis(config.billing_timeout_ms),
            )
            .await
        } else {
            warn!("billing system marked inactive; staging controls are disabled");
            (StagingDetector::Fallback, None)
        };

        let auth = AdminAuth::from_config(config.admin_token.as_deref());
        if auth.was_generated() {
            warn!(
                "{} no admin token configured; generated token={}",
                category_auth(),
                auth.token()
            );
        }

        let mut state = Self::new(config, store, detector, auth);
        if let Some(version) = reported_version {
            state.environment = Arc::new(HostEnvironment {
                billing_active: config.billing_active,
                billing_version: Some(version),
            });
        }
        Ok(state)
    }

    pub fn manager(&self) -> &StagingManager {
        &self.manager
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    fn diagnostics(&self) -> Result<Diagnostics, StagingError> {
        let raw_stored_value = self.manager.stored_url()?;
        Ok(Diagnostics {
            controller_version: version_text(),
            billing_active: self.environment.billing_active,
            billing_version: self.environment.billing_version.clone(),
            detector: self.manager.detector_kind(),
            stored_state: classify_stored_url(raw_stored_value.as_deref()),
            raw_stored_value,
        })
    }

    fn record(&self, counter: fn(&ControllerMetrics) -> &AtomicU64) {
        counter(&self.metrics).fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostics {
    pub controller_version: String,
    pub billing_active: bool,
    pub billing_version: Option<String>,
    pub detector: DetectorKind,
    pub raw_stored_value: Option<String>,
    pub stored_state: StoredUrlState,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    pub outcome: ActionOutcome,
    pub notice: String,
    pub status: StagingStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct AdminActionForm {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    wcs_staging_nonce: Option<String>,
    #[serde(default)]
    new_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct SiteUrlRequest {
    url: String,
}

/// Mutation requested through the form's `action` discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AdminAction {
    EnableLive,
    EnableStaging,
    UpdateUrl,
    RepairUrl,
}

impl AdminAction {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "enable_live" => Some(AdminAction::EnableLive),
            "enable_staging" => Some(AdminAction::EnableStaging),
            "update_url" => Some(AdminAction::UpdateUrl),
            "repair_url" => Some(AdminAction::RepairUrl),
            _ => None,
        }
    }

    fn apply(
        self,
        manager: &StagingManager,
        new_url: Option<&str>,
    ) -> Result<ActionOutcome, StagingError> {
        match self {
            AdminAction::EnableLive => manager.set_live_mode(),
            AdminAction::EnableStaging => manager.set_staging_mode(),
            AdminAction::UpdateUrl => manager.set_custom_url(new_url.unwrap_or_default()),
            AdminAction::RepairUrl => manager.repair_corrupted_url(),
        }
    }
}

#[derive(Debug)]
pub enum ControllerError {
    Unauthorized,
    InvalidNonce(NonceError),
    BillingInactive,
    BadRequest(String),
    Staging(StagingError),
}

impl ControllerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControllerError::Unauthorized | ControllerError::InvalidNonce(_) => {
                StatusCode::FORBIDDEN
            }
            ControllerError::BillingInactive => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControllerError::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::Unauthorized => {
                write!(f, "access denied: administrator credentials required")
            }
            ControllerError::InvalidNonce(err) => write!(f, "access denied: {err}"),
            ControllerError::BillingInactive => {
                write!(f, "the subscription billing system is not active")
            }
            ControllerError::BadRequest(message) => write!(f, "{message}"),
            ControllerError::Staging(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<StagingError> for ControllerError {
    fn from(err: StagingError) -> Self {
        ControllerError::Staging(err)
    }
}

fn json_error(err: ControllerError) -> (StatusCode, Json<ErrorResponse>) {
    (
        err.status_code(),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn html_error(err: ControllerError) -> (StatusCode, Html<String>) {
    let status = err.status_code();
    (status, Html(render::error_page(status, &err.to_string())))
}

pub fn build_controller_app(state: ControllerState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/", get(root_handler))
        .route(LOGIN_PATH, get(login_page_handler).post(login_handler))
        .route("/logout", post(logout_handler))
        .route(
            ADMIN_PAGE_PATH,
            get(admin_page_handler).post(admin_action_handler),
        )
        .route("/api/v1/status", get(api_status_handler))
        .route("/api/v1/diagnostics", get(api_diagnostics_handler))
        .route("/api/v1/mode/live", post(api_enable_live_handler))
        .route("/api/v1/mode/staging", post(api_enable_staging_handler))
        .route("/api/v1/site-url", put(api_update_url_handler))
        .route("/api/v1/site-url/repair", post(api_repair_url_handler))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

fn notice_redirect_target(outcome: ActionOutcome) -> String {
    let (key, value) = outcome.query_pair();
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    format!("{ADMIN_PAGE_PATH}?{query}")
}
