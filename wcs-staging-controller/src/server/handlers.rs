use super::*;

pub(super) async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    if path != "/healthz" {
        info!(
            "{} {} {} {} {}ms",
            category_access(),
            method_label(method.as_str()),
            status_label(response.status().as_u16()),
            uri,
            elapsed_ms
        );
    }
    response
}

pub(super) async fn healthz_handler() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

pub(super) async fn metrics_handler(State(state): State<ControllerState>) -> impl IntoResponse {
    let metrics = &state.metrics;
    let body = format!(
        concat!(
            "wcs_staging_controller_uptime_seconds {}\n",
            "wcs_staging_controller_page_views_total {}\n",
            "wcs_staging_controller_status_reads_total {}\n",
            "wcs_staging_controller_mutations_applied_total {}\n",
            "wcs_staging_controller_mutations_rejected_total {}\n",
            "wcs_staging_controller_mutations_failed_total {}\n",
            "wcs_staging_controller_auth_failures_total {}\n",
            "wcs_staging_controller_nonce_failures_total {}\n",
            "wcs_staging_controller_outstanding_nonces {}\n"
        ),
        metrics.started_at.elapsed().as_secs(),
        metrics.page_views_total.load(Ordering::Relaxed),
        metrics.status_reads_total.load(Ordering::Relaxed),
        metrics.mutations_applied_total.load(Ordering::Relaxed),
        metrics.mutations_rejected_total.load(Ordering::Relaxed),
        metrics.mutations_failed_total.load(Ordering::Relaxed),
        metrics.auth_failures_total.load(Ordering::Relaxed),
        metrics.nonce_failures_total.load(Ordering::Relaxed),
        state.nonces.outstanding(),
    );
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

pub(super) async fn root_handler() -> Redirect {
    Redirect::to(ADMIN_PAGE_PATH)
}

pub(super) async fn login_page_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Response {
    if state.auth.is_authorized(&headers) {
        return Redirect::to(ADMIN_PAGE_PATH).into_response();
    }
    Html(render::login_page(None)).into_response()
}

pub(super) async fn login_handler(
    State(state): State<ControllerState>,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.token.trim().is_empty() || !state.auth.token_matches(&form.token) {
        state.record(|metrics| &metrics.auth_failures_total);
        warn!("{} rejected login attempt", category_auth());
        return (
            StatusCode::FORBIDDEN,
            Html(render::login_page(Some("Invalid admin token."))),
        )
            .into_response();
    }
    let session = state.auth.start_session();
    info!("{} admin session started", category_auth());
    (
        [(SET_COOKIE, state.auth.session_cookie(&session))],
        Redirect::to(ADMIN_PAGE_PATH),
    )
        .into_response()
}

pub(super) async fn logout_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Response {
    if state.auth.end_session(&headers) {
        info!("{} admin session ended", category_auth());
    }
    (
        [(SET_COOKIE, state.auth.cleared_cookie())],
        Redirect::to(LOGIN_PATH),
    )
        .into_response()
}

pub(super) async fn admin_page_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    if !state.auth.is_authorized(&headers) {
        return Redirect::to(LOGIN_PATH).into_response();
    }
    state.record(|metrics| &metrics.page_views_total);

    let diagnostics = match state.diagnostics() {
        Ok(diagnostics) => diagnostics,
        Err(err) => {
            error!("admin page diagnostics failed: {err}");
            return html_error(err.into()).into_response();
        }
    };
    if !state.environment.billing_active {
        return no_store(Html(render::billing_inactive_page(&diagnostics)));
    }

    let status = match state.manager.status().await {
        Ok(status) => status,
        Err(err) => {
            error!("admin page status read failed: {err}");
            return html_error(err.into()).into_response();
        }
    };
    let notices = query
        .iter()
        .filter_map(|(key, value)| ActionOutcome::from_query_pair(key, value))
        .collect::<Vec<_>>();
    let nonce = state.nonces.issue(NONCE_ACTION);

    no_store(Html(render::admin_page(&render::AdminPageView {
        status: &status,
        notices: &notices,
        nonce: &nonce,
        diagnostics: &diagnostics,
    })))
}

pub(super) async fn admin_action_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
    Form(form): Form<AdminActionForm>,
) -> Response {
    match run_form_action(&state, &headers, form) {
        Ok(outcome) => Redirect::to(&notice_redirect_target(outcome)).into_response(),
        Err(err) => html_error(err).into_response(),
    }
}

fn run_form_action(
    state: &ControllerState,
    headers: &HeaderMap,
    form: AdminActionForm,
) -> Result<ActionOutcome, ControllerError> {
    if !state.auth.is_authorized(headers) {
        state.record(|metrics| &metrics.auth_failures_total);
        warn!("{} form submission without admin credentials", category_auth());
        return Err(ControllerError::Unauthorized);
    }
    if let Err(err) = state
        .nonces
        .verify(NONCE_ACTION, form.wcs_staging_nonce.as_deref())
    {
        state.record(|metrics| &metrics.nonce_failures_total);
        warn!("{} form submission rejected: {err}", category_auth());
        return Err(ControllerError::InvalidNonce(err));
    }
    let action = form
        .action
        .as_deref()
        .and_then(AdminAction::parse)
        .ok_or_else(|| {
            ControllerError::BadRequest(format!(
                "unknown action: {}",
                form.action.as_deref().unwrap_or("<missing>")
            ))
        })?;
    apply_action(state, action, form.new_url.as_deref())
}

fn apply_action(
    state: &ControllerState,
    action: AdminAction,
    new_url: Option<&str>,
) -> Result<ActionOutcome, ControllerError> {
    if !state.environment.billing_active {
        warn!(
            "{} {action:?} refused: billing system inactive",
            category_mode()
        );
        return Err(ControllerError::BillingInactive);
    }
    match action.apply(&state.manager, new_url) {
        Ok(outcome) if outcome.is_success() => {
            state.record(|metrics| &metrics.mutations_applied_total);
            info!("{} {action:?} applied outcome={outcome:?}", category_mode());
            Ok(outcome)
        }
        Ok(outcome) => {
            state.record(|metrics| &metrics.mutations_rejected_total);
            warn!("{} {action:?} rejected outcome={outcome:?}", category_mode());
            Ok(outcome)
        }
        Err(err) => {
            state.record(|metrics| &metrics.mutations_failed_total);
            error!("{} {action:?} failed: {err}", category_mode());
            Err(err.into())
        }
    }
}

fn authorize_api(state: &ControllerState, headers: &HeaderMap) -> Result<(), ControllerError> {
    if state.auth.bearer_authorized(headers) {
        return Ok(());
    }
    state.record(|metrics| &metrics.auth_failures_total);
    warn!("{} api request without bearer token", category_auth());
    Err(ControllerError::Unauthorized)
}

pub(super) async fn api_status_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Result<Json<StagingStatus>, (StatusCode, Json<ErrorResponse>)> {
    authorize_api(&state, &headers).map_err(json_error)?;
    state.record(|metrics| &metrics.status_reads_total);
    let status = state
        .manager
        .status()
        .await
        .map_err(|err| json_error(err.into()))?;
    Ok(Json(status))
}

pub(super) async fn api_diagnostics_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Result<Json<Diagnostics>, (StatusCode, Json<ErrorResponse>)> {
    authorize_api(&state, &headers).map_err(json_error)?;
    let diagnostics = state.diagnostics().map_err(|err| json_error(err.into()))?;
    Ok(Json(diagnostics))
}

pub(super) async fn api_enable_live_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Result<Json<MutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_api_action(&state, &headers, AdminAction::EnableLive, None).await
}

pub(super) async fn api_enable_staging_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Result<Json<MutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_api_action(&state, &headers, AdminAction::EnableStaging, None).await
}

pub(super) async fn api_update_url_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
    Json(request): Json<SiteUrlRequest>,
) -> Result<Json<MutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_api_action(&state, &headers, AdminAction::UpdateUrl, Some(&request.url)).await
}

pub(super) async fn api_repair_url_handler(
    State(state): State<ControllerState>,
    headers: HeaderMap,
) -> Result<Json<MutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_api_action(&state, &headers, AdminAction::RepairUrl, None).await
}

async fn run_api_action(
    state: &ControllerState,
    headers: &HeaderMap,
    action: AdminAction,
    new_url: Option<&str>,
) -> Result<Json<MutationResponse>, (StatusCode, Json<ErrorResponse>)> {
    authorize_api(state, headers).map_err(json_error)?;
    let outcome = apply_action(state, action, new_url).map_err(json_error)?;
    if !outcome.is_success() {
        return Err(json_error(ControllerError::BadRequest(
            outcome.notice().to_string(),
        )));
    }
    let status = state
        .manager
        .status()
        .await
        .map_err(|err| json_error(err.into()))?;
    Ok(Json(MutationResponse {
        outcome,
        notice: outcome.notice().to_string(),
        status,
    }))
}

fn no_store(page: Html<String>) -> Response {
    ([(CACHE_CONTROL, "no-store")], page).into_response()
}
