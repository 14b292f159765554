//! WebSocket handler streaming per-job progress events.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use kyoku_models::{JobEvent, JobId, JobStatus};

use crate::state::AppState;

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Send a job event with backpressure handling.
async fn send_event(tx: &mpsc::Sender<Message>, event: &JobEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    // Use try_send for non-blocking, fall back to blocking send
    match tx.try_send(Message::Text(json.clone())) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(Message::Text(json)).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Terminal event reconstructed from a job record, for subscribers that
/// connected after (or raced with) the live terminal publish.
fn terminal_event(job: &kyoku_models::Job) -> Option<JobEvent> {
    match job.status {
        JobStatus::Completed => Some(JobEvent::done(
            job.id.as_str(),
            job.output_path.clone().unwrap_or_default(),
        )),
        JobStatus::Failed => Some(JobEvent::error(
            job.error_message.clone().unwrap_or_else(|| "render failed".to_string()),
        )),
        JobStatus::Cancelled => Some(JobEvent::error("job cancelled")),
        _ => None,
    }
}

/// WebSocket endpoint for one job's event stream.
pub async fn ws_job_events(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let job_id = JobId::from_string(job_id);
    ws.on_upgrade(move |socket| handle_job_socket(socket, state, job_id))
}

/// Stream events for `job_id` until a terminal event or disconnect.
async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel for backpressure toward the client.
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let job = match state.manager.status(&job_id).await {
        Ok(job) => job,
        Err(_) => {
            let error = JobEvent::error(format!("unknown job: {}", job_id));
            let _ = send_event(&tx, &error).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    // Subscribe before the terminal check so events published in between are
    // not lost.
    let events = state.manager.events();
    let connection = events.connection_id();
    let mut stream = events.subscribe(connection, &job_id).await;

    let manager = state.manager.clone();
    let _guard = scopeguard::guard((), move |_| {
        tokio::spawn(async move {
            manager.events().unsubscribe(connection).await;
        });
    });

    info!(job_id = %job_id, connection, "WebSocket subscriber attached");

    if let Some(event) = terminal_event(&job) {
        // Already over: there will be no live events, emit the result.
        let _ = send_event(&tx, &event).await;
    } else {
        let mut terminal_sent = false;
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                event = stream.recv() => {
                    match event {
                        Some(event) => {
                            let is_terminal = event.is_terminal();
                            if !send_event(&tx, &event).await {
                                warn!(job_id = %job_id, "WebSocket send failed, client disconnected");
                                break;
                            }
                            if is_terminal {
                                terminal_sent = true;
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if tx.send(Message::Ping(vec![])).await.is_err() {
                        warn!(job_id = %job_id, "Heartbeat failed, client disconnected");
                        break;
                    }
                }
                client_msg = receiver.next() => {
                    match client_msg {
                        Some(Ok(Message::Close(_))) | None => {
                            info!(job_id = %job_id, "Client closed connection");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        // If the live stream ended without a terminal event (e.g. the
        // publish raced the subscription), fall back to the record.
        if !terminal_sent {
            if let Ok(job) = state.manager.status(&job_id).await {
                if let Some(event) = terminal_event(&job) {
                    let _ = send_event(&tx, &event).await;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    info!(job_id = %job_id, connection, "WebSocket subscriber detached");
}
