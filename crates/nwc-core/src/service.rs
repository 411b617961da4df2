//! Process wiring: owns the relay connection and the current
//! [`MainSubscription`], and spawns one task per dispatched request so a
//! slow host-wallet call never blocks the websocket read loop.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::event::{KIND_REQUEST, KIND_RESPONSE};
use crate::relay::{next_sub_id, Backoff, InboundFrame, OutboundFrame, RelayClient};
use crate::subscription::{MainSubscription, RequestDisposition, LOOKBACK_SECS};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

/// Spawn the relay connection and its request-handling loop. Runs until
/// `shutdown` is cancelled.
pub fn spawn(url: url::Url, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> RelayClient {
    let (relay, inbound) = RelayClient::spawn(url, shutdown.clone());
    tokio::spawn(run(relay.clone(), inbound, dispatcher, shutdown));
    relay
}

async fn run(
    relay: RelayClient,
    mut inbound: tokio::sync::mpsc::Receiver<InboundFrame>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let mut sub = Arc::new(Mutex::new(resubscribe(&relay, &dispatcher).await));
    let mut resubscribe_backoff = Backoff::new();
    let mut last_closed: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = inbound.recv() => {
                let Some(frame) = frame else { return };
                handle_frame(&relay, &dispatcher, &mut sub, frame, &mut resubscribe_backoff, &mut last_closed).await;
            }
        }
    }
}

async fn handle_frame(
    relay: &RelayClient,
    dispatcher: &Arc<Dispatcher>,
    sub: &mut Arc<Mutex<MainSubscription>>,
    frame: InboundFrame,
    resubscribe_backoff: &mut Backoff,
    last_closed: &mut Option<Instant>,
) {
    match frame {
        InboundFrame::Event { sub_id, event } => {
            let mut guard = sub.lock().await;
            if event.kind == KIND_REQUEST && sub_id == guard.requests_sub_id {
                match guard.handle_request(event) {
                    RequestDisposition::Dispatch(event) => {
                        drop(guard);
                        spawn_dispatch(relay.clone(), dispatcher.clone(), sub.clone(), event);
                    }
                    RequestDisposition::Buffered => {}
                }
            } else if event.kind == KIND_RESPONSE && sub_id == guard.responses_sub_id {
                if let Some(request_id) = event.tag_value("e") {
                    guard.mark_responded(request_id.to_string());
                }
            }
        }
        InboundFrame::Eose { sub_id } => {
            let batch = {
                let mut guard = sub.lock().await;
                guard.observe_eose(&sub_id)
            };
            for event in batch {
                spawn_dispatch(relay.clone(), dispatcher.clone(), sub.clone(), event);
            }
        }
        InboundFrame::Closed { sub_id, reason } => {
            warn!(sub_id, reason = reason.as_deref().unwrap_or("<none>"), "subscription closed, backing off before resubscribe");
            if let Some(last) = *last_closed {
                resubscribe_backoff.observe_attempt_duration(last.elapsed());
            }
            resubscribe_backoff.wait().await;
            *last_closed = Some(Instant::now());
            *sub = Arc::new(Mutex::new(resubscribe(relay, dispatcher).await));
        }
        InboundFrame::Notice { message } => {
            info!(%message, "relay notice");
        }
        InboundFrame::Ok { .. } => {}
    }
}

fn spawn_dispatch(
    relay: RelayClient,
    dispatcher: Arc<Dispatcher>,
    sub: Arc<Mutex<MainSubscription>>,
    event: crate::event::NostrEvent,
) {
    tokio::spawn(async move {
        let request_id = event.id.clone();
        let responses = dispatcher.handle_request(&event, now()).await;
        for response in responses {
            sub.lock().await.mark_responded(request_id.clone());
            if let Err(e) = relay.send(OutboundFrame::Event { event: response }).await {
                warn!(error = %e, "failed to send response event");
            }
        }
    });
}

async fn resubscribe(relay: &RelayClient, dispatcher: &Dispatcher) -> MainSubscription {
    let provider_pubkey = dispatcher.provider_pubkey().to_hex();
    let since = now().saturating_sub(LOOKBACK_SECS);

    let _ = relay
        .send(OutboundFrame::Event {
            event: dispatcher.build_info_event(now()),
        })
        .await;

    let requests_sub_id = next_sub_id();
    let responses_sub_id = next_sub_id();

    let _ = relay
        .send(OutboundFrame::Req {
            sub_id: requests_sub_id.clone(),
            filter: json!({ "kinds": [KIND_REQUEST], "#p": [provider_pubkey], "since": since }),
        })
        .await;
    let _ = relay
        .send(OutboundFrame::Req {
            sub_id: responses_sub_id.clone(),
            filter: json!({ "kinds": [KIND_RESPONSE], "authors": [provider_pubkey], "since": since }),
        })
        .await;

    MainSubscription::new(requests_sub_id, responses_sub_id)
}
