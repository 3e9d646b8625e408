//! WebSocket control channel to the conversational service.
//!
//! Implements the [`MediaConnector`]/[`MediaSession`] seams over
//! `tokio-tungstenite`: the socket is authorized with the minted ephemeral
//! secret and carries the JSON event grammar both ways.

use hearth_types::TokenGrant;
use hearth_voice::{MediaConnector, MediaSession, OutboundFrame, SessionError};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::RealtimeConfig;

/// Connects authorized control-channel sockets for minted grants.
#[derive(Debug, Clone)]
pub struct RealtimeConnector {
    url: String,
}

impl RealtimeConnector {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
        }
    }
}

impl MediaConnector for RealtimeConnector {
    type Session = RealtimeSocket;

    async fn connect(&self, grant: &TokenGrant) -> Result<RealtimeSocket, SessionError> {
        let secret = grant
            .secret()
            .ok_or_else(|| SessionError::Media("token grant carried no secret".into()))?;
        let url = format!("{}?model={}", self.url, grant.model);
        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Media(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {secret}"))
            .map_err(|e| SessionError::Media(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| SessionError::Media(e.to_string()))?;
        tracing::info!(model = %grant.model, "control channel established");
        Ok(RealtimeSocket { stream })
    }
}

/// One live control-channel socket.
pub struct RealtimeSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MediaSession for RealtimeSocket {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), SessionError> {
        let text =
            serde_json::to_string(&frame).map_err(|e| SessionError::Media(e.to_string()))?;
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| SessionError::Media(e.to_string()))
    }

    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(frame = ?frame, "control channel closed by peer");
                    return None;
                }
                // Pings are answered by tungstenite itself; binary frames
                // carry audio we do not consume on this channel.
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "control channel read failed");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "control channel close failed");
        }
    }
}
