use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelTransport};
use crate::errors::{ChannelError, ReportError};
use crate::model::SessionId;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket channels, tagging each with the session header.
pub struct WebSocketTransport {
    url: String,
    session_header: HeaderName,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, session_header: &str) -> Result<Self, ReportError> {
        let session_header = HeaderName::from_bytes(session_header.trim().as_bytes())
            .map_err(|e| ReportError::config(format!("invalid session header name: {e}")))?;
        Ok(Self {
            url: url.into(),
            session_header,
        })
    }
}

#[async_trait::async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn open(&self, session_id: &SessionId) -> Result<Box<dyn Channel>, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::transport(format!("invalid channel url: {e}")))?;
        let value = HeaderValue::from_str(session_id.as_str())
            .map_err(|e| ChannelError::transport(format!("invalid session id header: {e}")))?;
        request
            .headers_mut()
            .insert(self.session_header.clone(), value);

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| ChannelError::transport(format!("websocket connect failed: {e}")))?;
        debug!(session_id = %session_id, status = %response.status(), "websocket connected");
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WsConnection,
}

#[async_trait::async_trait]
impl Channel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::transport(format!("websocket send failed: {e}")))
    }

    async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        warn!("dropping non-utf8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by server");
                    return None;
                }
                // tungstenite answers pings itself on the next read or write.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => {
                    return Some(Err(ChannelError::transport(format!(
                        "websocket read failed: {e}"
                    ))));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_names() {
        assert!(WebSocketTransport::new("ws://localhost/x", "X-Session-Id").is_ok());
        let err = WebSocketTransport::new("ws://localhost/x", "bad header").err();
        assert!(matches!(err, Some(ReportError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let transport =
            WebSocketTransport::new("ws://127.0.0.1:9/stream", "X-Session-Id").expect("transport");
        let err = transport
            .open(&SessionId::from("s"))
            .await
            .err()
            .expect("connect fails");
        assert!(err.message().contains("connect failed"));
    }
}
