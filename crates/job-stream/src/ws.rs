//! WebSocket gateway: `GET /ws/jobs?period=<ms>`.
//!
//! Validates the period, then bridges the socket's lifecycle to a
//! [`Session`]. Close, transport errors and a session closing itself all end
//! in the same teardown: unregistering the connection, then finishing the
//! close handshake when the peer is still there.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::period::{Period, PeriodError};
use crate::protocol::{ChannelPublisher, Publisher, ServerEvent, CLOSE_INVALID_PERIOD};
use crate::session::Session;
use crate::state::AppState;

/// How long teardown waits on the writer task or the peer's close reply.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// The client sent a Close frame; it is owed our reply.
    PeerClosed,
    /// The session closed itself or the server is shutting down.
    SessionClosed,
    /// The transport failed or hit EOF; there is nobody left to talk to.
    TransportLost,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let period = match query {
        Ok(Query(pairs)) => Period::from_query_pairs(&pairs),
        Err(rejection) => Err(PeriodError::NotWholeNumber(rejection.body_text())),
    };
    match period {
        Ok(period) => ws.on_upgrade(move |socket| handle_socket(socket, state, period)),
        Err(err) => {
            warn!(error = %err, "rejecting connection with invalid period");
            ws.on_upgrade(move |socket| reject(socket, err))
        }
    }
}

async fn reject(mut socket: WebSocket, err: PeriodError) {
    let frame = CloseFrame {
        code: CLOSE_INVALID_PERIOD,
        reason: err.close_reason().into(),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }
    // Read until the client's reply so the socket is not torn down mid-handshake.
    while let Ok(Some(Ok(_))) = tokio::time::timeout(CLOSE_TIMEOUT, socket.recv()).await {}
}

async fn handle_socket(socket: WebSocket, state: AppState, period: Period) {
    let (mut sink, mut stream) = socket.split();

    // Every outbound frame goes through this queue, so the snapshot queued
    // below is always the first thing the client sees.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let publisher = Arc::new(ChannelPublisher::new(tx));

    let connection_id = state.registry.next_connection_id();
    let session = Session::new(
        connection_id,
        period,
        state.simulation.as_ref().clone(),
        publisher.clone(),
    );

    let snapshot = session.snapshot();
    let job_count = snapshot.len();
    if let Err(e) = publisher.publish(&ServerEvent::InitialJobs(snapshot)) {
        warn!(connection_id = %connection_id, error = %e, "failed to queue initial jobs");
        return;
    }

    if let Err(e) = state.registry.register(session.clone()) {
        error!(connection_id = %connection_id, error = %e, "session registry out of sync");
        session.close();
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "Internal error".into(),
            })))
            .await;
        return;
    }
    session.start();
    let closed = session.closed_signal();
    let writer_stop = session.closed_signal();
    drop(session);
    drop(publisher);

    info!(
        connection_id = %connection_id,
        period_ms = period.as_millis(),
        jobs = job_count,
        "client connected"
    );

    // Stops as soon as the session is closed and hands the sink back, so
    // teardown can still write the close handshake.
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = writer_stop.cancelled() => break,
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        }
        sink
    });

    let ending = loop {
        tokio::select! {
            _ = closed.cancelled() => {
                debug!(connection_id = %connection_id, "session closed");
                break Ending::SessionClosed;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) => break Ending::PeerClosed,
                None => break Ending::TransportLost,
                Some(Ok(Message::Text(text))) => {
                    debug!(connection_id = %connection_id, message = %text.as_str(), "ignoring client message");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "websocket error");
                    break Ending::TransportLost;
                }
            }
        }
    };

    // Closes the session, which also stops the writer task.
    if let Err(e) = state.registry.unregister(connection_id) {
        error!(connection_id = %connection_id, error = %e, "session registry out of sync");
    }

    if ending == Ending::TransportLost {
        forward_task.abort();
    } else {
        match tokio::time::timeout(CLOSE_TIMEOUT, forward_task).await {
            Ok(Ok(sink)) => finish_close(sink, stream, ending).await,
            Ok(Err(e)) => warn!(connection_id = %connection_id, error = %e, "writer task failed"),
            Err(_) => warn!(connection_id = %connection_id, "writer task did not stop in time"),
        }
    }
    info!(connection_id = %connection_id, ?ending, "client disconnected");
}

/// Complete the close handshake on a socket whose writer has stopped.
async fn finish_close(
    mut sink: SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    ending: Ending,
) {
    match ending {
        Ending::PeerClosed => {
            // The reply to the peer's Close is already queued; closing flushes it.
            let _ = sink.close().await;
        }
        Ending::SessionClosed => {
            let frame = CloseFrame {
                code: close_code::NORMAL,
                reason: "Session closed".into(),
            };
            if sink.send(Message::Close(Some(frame))).await.is_err() {
                return;
            }
            while let Ok(Some(Ok(_))) = tokio::time::timeout(CLOSE_TIMEOUT, stream.next()).await {}
        }
        Ending::TransportLost => {}
    }
}
