#[derive(Debug, Deserialize)]
struct TimelineQuery {
    cursor: Option<usize>,
    page_size: Option<usize>,
}

async fn get_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    Ok(Json(engine.status()))
}

async fn get_timeline(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<EventPage>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;

    let events = engine.events();
    let (start, end, next_cursor) = paginate(events.len(), query.cursor, query.page_size)?;
    Ok(Json(EventPage {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        events: events[start..end].to_vec(),
        total: events.len(),
        next_cursor,
    }))
}

async fn get_region_inspector(
    State(state): State<AppState>,
    Path((run_id, region_id)): Path<(String, u32)>,
) -> Result<Json<Value>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    engine.inspect_region(region_id).map(Json).ok_or_else(|| {
        HttpApiError::not_found("region not found", Some(format!("region_id={region_id}")))
    })
}

async fn get_agent_inspector(
    State(state): State<AppState>,
    Path((run_id, agent_id)): Path<(String, u64)>,
) -> Result<Json<Value>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    engine.inspect_agent(agent_id).map(Json).ok_or_else(|| {
        HttpApiError::not_found("agent not found", Some(format!("agent_id={agent_id}")))
    })
}

async fn get_snapshots(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<Snapshot>>, HttpApiError> {
    let inner = state.inner.lock().await;
    let engine = require_run(&inner, &run_id)?;
    Ok(Json(vec![engine.snapshot_for_current_tick()]))
}
