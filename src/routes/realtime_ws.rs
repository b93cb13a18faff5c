//! Realtime WebSocket feed
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:8080/realtime?token=<jwt>`
//!
//! Messages (server → client):
//! - `session` - Current session snapshot, sent on connect and whenever the
//!   user's profile or subscription row changes
//! - `change` - A row change matching one of the client's filters
//! - `subscribed` - Active filters after a subscribe/unsubscribe
//! - `pong` - Reply to `ping`
//! - `error` - Unparseable client message, or a subscribe past the filter cap
//!
//! Messages (client → server):
//! - `subscribe` - Add filters (`{ table, column?, value? }`)
//! - `unsubscribe` - Remove filters
//! - `ping` - Keep-alive ping
//!
//! ```json
//! // Client subscribes to its own notifications
//! { "type": "subscribe", "filters": [{ "table": "notifications", "column": "user_id", "value": "<id>" }] }
//!
//! // Server pushes a change
//! { "type": "change", "event": { "table": "notifications", "op": "insert", "timestamp": "...", "record": { ... } } }
//! ```
//!
//! Every connection starts subscribed to its own notifications and holds at
//! most [`MAX_FILTERS_PER_CONNECTION`] filters. A client only ever receives
//! events whose audience includes it.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::auth::session::SessionView;
use crate::auth::{extract_token_from_header, extract_token_from_url, Identity, SessionContext};
use crate::db::NOTIFICATION_COLLECTION;
use crate::feed::{ChangeEvent, ChangeFilter, FeedSubscription};
use crate::routes::{error_response, to_boxed, validate_ws_token, BoxBody};
use crate::server::AppState;
use crate::services::ServiceContext;
use crate::types::ConnectError;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Message sent from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Session { session: SessionView<'a> },
    Change { event: &'a ChangeEvent },
    Subscribed { filters: &'a [ChangeFilter] },
    Pong { timestamp: String },
    Error { message: String },
}

/// Message received from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        filters: Vec<ChangeFilter>,
    },
    Unsubscribe {
        #[serde(default)]
        filters: Vec<ChangeFilter>,
    },
    Ping,
}

/// Filters a single connection may hold
pub const MAX_FILTERS_PER_CONNECTION: usize = 32;

/// Add client filters. A batch that would pass the cap is refused whole.
fn add_filters(feed: &mut FeedSubscription, filters: Vec<ChangeFilter>) -> Result<(), String> {
    let room = MAX_FILTERS_PER_CONNECTION.saturating_sub(feed.filters().len());
    let mut fresh: Vec<ChangeFilter> = Vec::new();
    for filter in filters {
        if feed.filters().contains(&filter) || fresh.contains(&filter) {
            continue;
        }
        if fresh.len() == room {
            return Err(format!(
                "Too many filters (max {} per connection)",
                MAX_FILTERS_PER_CONNECTION
            ));
        }
        fresh.push(filter);
    }
    for filter in fresh {
        feed.add_filter(filter);
    }
    Ok(())
}

fn encode(message: &ServerMessage<'_>) -> Result<WsMessage, serde_json::Error> {
    Ok(WsMessage::Text(serde_json::to_string(message)?))
}

/// Handle WebSocket upgrade for the realtime feed
pub async fn handle_realtime_ws(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(ConnectError::BadRequest("WebSocket upgrade required".into()));
    }

    let token = extract_token_from_url(&req.uri().to_string(), "token").or_else(|| {
        let header = req
            .headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        extract_token_from_header(header).map(str::to_string)
    });
    let Some(identity) = token.and_then(|t| validate_ws_token(&state, &t)) else {
        return error_response(ConnectError::Unauthorized("Invalid or missing token".into()));
    };

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok((resp, ws)) => (resp, ws),
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return error_response(ConnectError::Internal("WebSocket upgrade failed".into()));
        }
    };

    let ctx = state.ctx.clone();
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = handle_realtime_connection(ws, ctx, identity).await {
                    warn!("Realtime WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    to_boxed(Response::from_parts(parts, Full::new(Bytes::new())))
}

/// Handle an individual realtime connection
async fn handle_realtime_connection(
    ws: HyperWebSocket,
    ctx: ServiceContext,
    identity: Identity,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut sender, mut receiver) = ws.split();
    let user_id = identity.user_id.clone();
    info!(user_id = %user_id, "Realtime client connected");

    let session = Arc::new(SessionContext::new(ctx.sessions()));
    let watcher = Arc::clone(&session).watch_feed(&ctx.feed);
    session.set_identity(Some(identity)).await;

    let mut session_rx = session.subscribe();
    {
        let current = session_rx.borrow_and_update().clone();
        sender
            .send(encode(&ServerMessage::Session {
                session: current.view(),
            })?)
            .await?;
    }

    let mut feed = ctx
        .feed
        .subscribe(vec![ChangeFilter::eq(NOTIFICATION_COLLECTION, "user_id", user_id.as_str())]);

    let result = loop {
        tokio::select! {
            // Session snapshot replaced
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = session_rx.borrow_and_update().clone();
                let msg = encode(&ServerMessage::Session { session: current.view() })?;
                if sender.send(msg).await.is_err() {
                    break Ok(());
                }
            }

            // Row change matching a client filter
            event = feed.next() => {
                match event {
                    Some(event) if event.is_visible_to(&user_id) => {
                        let msg = encode(&ServerMessage::Change { event: &event })?;
                        if sender.send(msg).await.is_err() {
                            break Ok(());
                        }
                    }
                    Some(_) => {}
                    None => break Ok(()),
                }
            }

            // Message from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { filters }) => match add_filters(&mut feed, filters) {
                                Ok(()) => {
                                    debug!(user_id = %user_id, filters = feed.filters().len(), "Client subscribed");
                                    encode(&ServerMessage::Subscribed { filters: feed.filters() })?
                                }
                                Err(message) => {
                                    warn!(user_id = %user_id, "Subscribe refused: {}", message);
                                    encode(&ServerMessage::Error { message })?
                                }
                            },
                            Ok(ClientMessage::Unsubscribe { filters }) => {
                                for filter in &filters {
                                    feed.remove_filter(filter);
                                }
                                encode(&ServerMessage::Subscribed { filters: feed.filters() })?
                            }
                            Ok(ClientMessage::Ping) => encode(&ServerMessage::Pong {
                                timestamp: chrono::Utc::now().to_rfc3339(),
                            })?,
                            Err(e) => encode(&ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            })?,
                        };
                        if sender.send(reply).await.is_err() {
                            break Ok(());
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => break Ok(()),
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                    _ => {}
                }
            }
        }
    };

    watcher.abort();
    info!(user_id = %user_id, "Realtime client disconnected");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::feed::{ChangeFeed, ChangeOp};

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"subscribe","filters":[{"table":"notifications","column":"user_id","value":"u1"}]}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Subscribe { filters } => {
                assert_eq!(filters, vec![ChangeFilter::eq("notifications", "user_id", "u1")]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
    }

    #[test]
    fn test_subscribe_filter_cap() {
        let feed = ChangeFeed::new(8);
        let own = ChangeFilter::eq(NOTIFICATION_COLLECTION, "user_id", "u1");
        let mut sub = feed.subscribe(vec![own.clone()]);

        // Duplicates do not count against the cap
        let batch: Vec<_> = (1..MAX_FILTERS_PER_CONNECTION)
            .map(|i| ChangeFilter::eq("messages", "conversation_id", format!("c{i}")))
            .chain(std::iter::once(own))
            .collect();
        add_filters(&mut sub, batch).unwrap();
        assert_eq!(sub.filters().len(), MAX_FILTERS_PER_CONNECTION);

        let err = add_filters(&mut sub, vec![ChangeFilter::table("projects")]).unwrap_err();
        assert!(err.contains("max"));
        assert_eq!(sub.filters().len(), MAX_FILTERS_PER_CONNECTION);

        sub.remove_filter(&ChangeFilter::eq("messages", "conversation_id", "c1"));
        add_filters(&mut sub, vec![ChangeFilter::table("projects")]).unwrap();
        assert_eq!(sub.filters().len(), MAX_FILTERS_PER_CONNECTION);
    }

    #[test]
    fn test_oversized_subscribe_adds_nothing() {
        let mut sub = ChangeFeed::new(8).subscribe(vec![]);
        let batch: Vec<_> = (0..1000)
            .map(|i| ChangeFilter::eq("projects", "id", format!("p{i}")))
            .collect();
        assert!(add_filters(&mut sub, batch).is_err());
        assert!(sub.filters().is_empty());
    }

    #[test]
    fn test_change_message_hides_audience() {
        let event = ChangeEvent {
            table: "messages".into(),
            op: ChangeOp::Insert,
            timestamp: "2024-01-15T10:30:00Z".into(),
            record: serde_json::json!({"id": "m1"}),
            audience: vec!["u1".into()],
        };
        let json = serde_json::to_value(ServerMessage::Change { event: &event }).unwrap();
        assert_eq!(json["type"], "change");
        assert_eq!(json["event"]["table"], "messages");
        assert!(json["event"].get("audience").is_none());
    }

    #[test]
    fn test_session_message_is_fail_closed_while_loading() {
        let session = Session::loading(None);
        let json = serde_json::to_value(ServerMessage::Session {
            session: session.view(),
        })
        .unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["session"]["loading"], true);
        assert_eq!(json["session"]["isAdmin"], false);
    }
}
