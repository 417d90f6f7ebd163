#[derive(Debug, Deserialize)]
struct CreateRunRequest {
    config: RunConfig,
    #[serde(default)]
    attach_sqlite: bool,
    #[serde(default)]
    sqlite_path: Option<String>,
    #[serde(default)]
    replace_existing: bool,
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    #[serde(default = "default_step_count")]
    steps: u64,
}

fn default_step_count() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct RunToTickRequest {
    tick: u64,
}

async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<Json<RunStatus>, HttpApiError> {
    if request.config.schema_version != SCHEMA_VERSION_V1 {
        return Err(HttpApiError::invalid_command(
            "unsupported config schema version",
            Some(request.config.schema_version),
        ));
    }

    let mut engine = EngineApi::from_config(request.config).map_err(|err| {
        HttpApiError::invalid_command("run configuration rejected", Some(err.to_string()))
    })?;

    if request.attach_sqlite {
        let path = request
            .sqlite_path
            .clone()
            .unwrap_or_else(default_sqlite_path);
        engine
            .attach_sqlite_store(&path)
            .map_err(HttpApiError::from_persistence)?;
        engine
            .initialize_run_storage(request.replace_existing)
            .map_err(HttpApiError::from_persistence)?;
    }

    let status = engine.status();
    let mut inner = state.inner.lock().await;
    inner.engine = Some(engine);
    inner.emitted_event_count = 0;
    inner.last_snapshot_tick = None;
    Ok(Json(status))
}

async fn list_runs(State(state): State<AppState>) -> Json<Value> {
    let inner = state.inner.lock().await;
    let active = inner.engine.as_ref().map(|engine| engine.status());
    let persisted = inner
        .engine
        .as_ref()
        .and_then(|engine| engine.persisted_runs().ok())
        .unwrap_or_default();
    Json(json!({ "active": active, "persisted": persisted }))
}

async fn start_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let status = require_run_mut(&mut inner, &run_id)?.start();
    let messages = collect_delta_messages(&mut inner);
    drop(inner);
    broadcast_messages(&state, messages);
    Ok(Json(status))
}

async fn pause_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let status = require_run_mut(&mut inner, &run_id)?.pause();
    let messages = collect_delta_messages(&mut inner);
    drop(inner);
    broadcast_messages(&state, messages);
    Ok(Json(status))
}

async fn step_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(request): Json<StepRequest>,
) -> Result<Json<Value>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let (status, committed) = require_run_mut(&mut inner, &run_id)?.step(request.steps);
    let messages = collect_delta_messages(&mut inner);
    drop(inner);
    broadcast_messages(&state, messages);
    Ok(Json(json!({ "status": status, "committed": committed })))
}

async fn run_to_tick(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(request): Json<RunToTickRequest>,
) -> Result<Json<Value>, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let (status, committed) = require_run_mut(&mut inner, &run_id)?.run_to_tick(request.tick);
    let messages = collect_delta_messages(&mut inner);
    drop(inner);
    broadcast_messages(&state, messages);
    Ok(Json(json!({ "status": status, "committed": committed })))
}

async fn submit_command(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(command): Json<Command>,
) -> Result<Response, HttpApiError> {
    let mut inner = state.inner.lock().await;
    let result = require_run_mut(&mut inner, &run_id)?.submit_command(command);
    let messages = collect_delta_messages(&mut inner);
    drop(inner);
    broadcast_messages(&state, messages);

    let status = if result.accepted {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(result)).into_response())
}

async fn get_commands(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    Ok(Json(json!({ "commands": engine.command_audit() })))
}
