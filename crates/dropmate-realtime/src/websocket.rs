//! WebSocket channel transport.

use crate::{
    ChannelCredentials, ChannelLink, ChannelTransport, ClientFrame, RealtimeError, RealtimeEvent,
    RealtimeResult, ServerFrame,
};
use async_trait::async_trait;
use dropmate_config_and_utils::Config;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Channel endpoint (ws:// or wss://).
    pub url: Url,
    /// Interval between `ping` frames.
    pub heartbeat_interval: Duration,
}

impl WebSocketConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            heartbeat_interval: Duration::from_secs(
                dropmate_config_and_utils::DEFAULT_HEARTBEAT_INTERVAL_SECS,
            ),
        }
    }

    pub fn from_config(config: &Config) -> RealtimeResult<Self> {
        let url = config
            .realtime_url()
            .map_err(|e| RealtimeError::Config(e.to_string()))?;
        Ok(Self {
            heartbeat_interval: config.heartbeat_interval(),
            ..Self::new(url)
        })
    }
}

/// Realtime channel over a WebSocket.
///
/// The bearer token goes in the upgrade request's `Authorization` header and
/// again in the first `auth` frame, with the user id. The connection counts
/// as established once the server answers with `connected`. There is no
/// handshake timeout; failures come from the socket itself.
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    async fn handshake(&self, socket: &mut Socket, credentials: &ChannelCredentials) -> RealtimeResult<String> {
        let auth = ClientFrame::auth(&credentials.token, &credentials.user_id).to_json()?;
        socket.send(Message::Text(auth.into())).await?;
        debug!("Sent auth frame");

        loop {
            let message = match socket.next().await {
                Some(message) => message?,
                None => {
                    return Err(RealtimeError::Handshake(
                        "connection closed before acknowledgement".to_string(),
                    ))
                }
            };

            match message {
                Message::Text(text) => match ServerFrame::parse(text.as_str())? {
                    ServerFrame::Connected { socket_id } => return Ok(socket_id),
                    ServerFrame::Error { message } => return Err(RealtimeError::Handshake(message)),
                    other => debug!(frame = ?other, "Ignoring frame before acknowledgement"),
                },
                Message::Ping(data) => socket.send(Message::Pong(data)).await?,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "connection closed before acknowledgement".to_string());
                    return Err(RealtimeError::Handshake(reason));
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn open(&self, credentials: &ChannelCredentials) -> RealtimeResult<ChannelLink> {
        info!(url = %self.config.url, "Connecting to realtime channel");

        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.token))
            .map_err(|e| RealtimeError::Config(format!("invalid token header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (mut socket, _) = connect_async(request).await?;

        let connection_id = self.handshake(&mut socket, credentials).await?;
        info!(connection_id = %connection_id, "Realtime channel connected");

        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        tokio::spawn(run(socket, events_tx, shutdown_rx, self.config.heartbeat_interval));

        Ok(ChannelLink {
            connection_id,
            events,
            shutdown,
        })
    }
}

async fn run(
    mut socket: Socket,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    mut shutdown: oneshot::Receiver<()>,
    heartbeat: Duration,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Closing realtime channel");
                let _ = socket.close(None).await;
                return;
            }
            _ = ticker.tick() => {
                let ping = match ClientFrame::Ping.to_json() {
                    Ok(ping) => ping,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode heartbeat");
                        continue;
                    }
                };
                if let Err(e) = socket.send(Message::Text(ping.into())).await {
                    let _ = events.send(RealtimeEvent::Disconnected { reason: Some(e.to_string()) });
                    return;
                }
            }
            message = socket.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime channel error");
                        let _ = events.send(RealtimeEvent::Disconnected { reason: Some(e.to_string()) });
                        return;
                    }
                    None => {
                        let _ = events.send(RealtimeEvent::Disconnected { reason: None });
                        return;
                    }
                };

                match message {
                    Message::Text(text) => {
                        let frame = match ServerFrame::parse(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse realtime frame");
                                continue;
                            }
                        };
                        match frame {
                            ServerFrame::Connected { .. } | ServerFrame::Pong => {}
                            ServerFrame::Unknown { event } => debug!(event = %event, "Ignoring unknown event"),
                            frame => {
                                if let Some(event) = frame.into_event() {
                                    if events.send(event).is_err() {
                                        let _ = socket.close(None).await;
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Message::Ping(data) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Message::Close(frame) => {
                        let reason = frame.map(|f| f.reason.as_str().to_string()).filter(|r| !r.is_empty());
                        info!(reason = ?reason, "Realtime channel closed by server");
                        let _ = events.send(RealtimeEvent::Disconnected { reason });
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropmate_types::ShipmentStatus;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn serve<F, Fut>(script: F) -> (Url, Arc<Mutex<Option<String>>>, tokio::task::JoinHandle<()>)
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let header = Arc::new(Mutex::new(None));
        let seen = header.clone();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = accept_hdr_async(stream, move |req: &Request, resp: Response| {
                *seen.lock() = req
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok::<_, ErrorResponse>(resp)
            })
            .await
            .unwrap();
            script(socket).await;
        });

        (Url::parse(&format!("ws://{addr}")).unwrap(), header, handle)
    }

    async fn next_text(socket: &mut ServerSocket) -> serde_json::Value {
        loop {
            match socket.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    }

    fn credentials() -> ChannelCredentials {
        ChannelCredentials {
            token: "tok-1".into(),
            user_id: "u1".into(),
        }
    }

    fn text(json: &str) -> Message {
        Message::Text(json.to_string().into())
    }

    #[tokio::test]
    async fn test_open_authenticates_and_forwards_events() {
        let (url, header, server) = serve(|mut socket| async move {
            let auth = next_text(&mut socket).await;
            assert_eq!(auth["event"], "auth");
            assert_eq!(auth["data"]["token"], "tok-1");
            assert_eq!(auth["data"]["userId"], "u1");

            socket.send(text(r#"{"event":"connected","data":{"socketId":"s-9"}}"#)).await.unwrap();
            socket
                .send(text(r#"{"event":"shipment:status","data":{"shipmentId":"abc123","status":"DELIVERED"}}"#))
                .await
                .unwrap();
            socket.send(text(r#"{"event":"pong"}"#)).await.unwrap();
            socket
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "bye".into(),
                })))
                .await
                .unwrap();
        })
        .await;

        let transport = WebSocketTransport::new(WebSocketConfig::new(url));
        let mut link = transport.open(&credentials()).await.unwrap();
        assert_eq!(link.connection_id, "s-9");
        assert_eq!(header.lock().as_deref(), Some("Bearer tok-1"));

        assert_eq!(
            link.events.recv().await,
            Some(RealtimeEvent::ShipmentStatusChanged {
                shipment_id: "abc123".into(),
                status: ShipmentStatus::Delivered
            })
        );
        assert_eq!(
            link.events.recv().await,
            Some(RealtimeEvent::Disconnected {
                reason: Some("bye".into())
            })
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let (url, _, server) = serve(|mut socket| async move {
            let _ = next_text(&mut socket).await;
            socket
                .send(text(r#"{"event":"error","data":{"message":"invalid token"}}"#))
                .await
                .unwrap();
        })
        .await;

        let transport = WebSocketTransport::new(WebSocketConfig::new(url));
        let err = transport.open(&credentials()).await.unwrap_err();
        match err {
            RealtimeError::Handshake(message) => assert_eq!(message, "invalid token"),
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_and_client_shutdown() {
        let (url, _, server) = serve(|mut socket| async move {
            let _ = next_text(&mut socket).await;
            socket.send(text(r#"{"event":"connected","data":{"socketId":"s-1"}}"#)).await.unwrap();

            let ping = next_text(&mut socket).await;
            assert_eq!(ping["event"], "ping");

            loop {
                match socket.next().await {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => continue,
                }
            }
        })
        .await;

        let config = WebSocketConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..WebSocketConfig::new(url)
        };
        let transport = WebSocketTransport::new(config);
        let link = transport.open(&credentials()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        link.shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
    }

    #[test]
    fn test_config_from_config() {
        let mut config = Config::default();
        config.realtime_url = "ws://localhost:4000/socket".into();
        config.heartbeat_interval_secs = 7;
        let ws = WebSocketConfig::from_config(&config).unwrap();
        assert_eq!(ws.url.as_str(), "ws://localhost:4000/socket");
        assert_eq!(ws.heartbeat_interval, Duration::from_secs(7));

        config.realtime_url = "https://localhost".into();
        assert!(matches!(
            WebSocketConfig::from_config(&config),
            Err(RealtimeError::Config(_))
        ));
    }
}
