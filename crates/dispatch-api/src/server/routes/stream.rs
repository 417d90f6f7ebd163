/// Frames pushed over the run's WebSocket: every appended event, snapshots
/// on their cadence, and persistence warnings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    EventAppended { event: contracts::Event },
    SnapshotCreated { snapshot: Snapshot },
    Warning { run_id: String, tick: u64, message: String },
}

async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, HttpApiError> {
    {
        let inner = state.inner.lock().await;
        require_run(&inner, &run_id)?;
    }
    Ok(ws.on_upgrade(move |socket| forward_stream(socket, state)))
}

async fn forward_stream(mut socket: WebSocket, state: AppState) {
    let mut receiver = state.stream_tx.subscribe();
    loop {
        match receiver.recv().await {
            Ok(message) => {
                let Ok(text) = serde_json::to_string(&message) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
