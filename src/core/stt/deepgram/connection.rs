//! WebSocket handshake for the streaming endpoint.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, error, info};
use url::Url;

use crate::core::stt::base::STTError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to open one streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    /// `ws://` or `wss://` endpoint, e.g. `wss://api.deepgram.com/v1/listen`
    pub endpoint: String,
    /// Extra request headers, including the auth header
    pub headers: Vec<(String, String)>,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Additional query parameters (model, feature flags), in order
    pub extra_params: Vec<(String, String)>,
}

impl ConnectRequest {
    /// Endpoint with the encoded query string appended.
    ///
    /// `encoding`, `sample_rate` and `channels` always come first, followed by
    /// `extra_params` in the order given.
    pub fn build_request_url(&self) -> Result<Url, STTError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            STTError::ConfigurationError(format!("Invalid endpoint {}: {e}", self.endpoint))
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(STTError::ConfigurationError(format!(
                    "Unsupported endpoint scheme '{other}', expected ws or wss"
                )));
            }
        }

        {
            let mut query_pairs = url.query_pairs_mut();
            query_pairs.append_pair("encoding", &self.encoding);
            query_pairs.append_pair("sample_rate", &self.sample_rate.to_string());
            query_pairs.append_pair("channels", &self.channels.to_string());
            for (key, value) in &self.extra_params {
                query_pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

/// An established connection, before its socket is handed to the reactor.
pub struct Connection {
    pub(crate) url: Url,
    pub(crate) stream: WsStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("url", &self.url.as_str()).finish()
    }
}

impl Connection {
    /// Request URL the handshake was made against.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Perform the WebSocket upgrade handshake.
///
/// Success means HTTP 101 Switching Protocols and nothing else; any other
/// status, a socket or TLS error, or exceeding `connect_timeout` yields
/// `ConnectFailure`. There is no retry. The returned stream is already
/// non-blocking and has Nagle disabled.
pub async fn open(
    request: &ConnectRequest,
    connect_timeout: Duration,
) -> Result<Connection, STTError> {
    let url = request.build_request_url()?;
    info!("Opening streaming connection to {}", url);

    let mut ws_request = url
        .as_str()
        .into_client_request()
        .map_err(|e| STTError::ConnectFailure(format!("Failed to build request: {e}")))?;

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            STTError::ConfigurationError(format!("Invalid header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            STTError::ConfigurationError(format!("Invalid value for header '{name}': {e}"))
        })?;
        ws_request.headers_mut().insert(name, value);
    }

    if url.scheme() == "wss" {
        install_crypto_provider();
    }

    let handshake = connect_async_tls_with_config(ws_request, None, true, None);
    let (stream, response) = match timeout(connect_timeout, handshake).await {
        Ok(Ok(result)) => result,
        Ok(Err(WsError::Http(response))) => {
            let stt_error = STTError::ConnectFailure(format!(
                "Handshake rejected with HTTP {}",
                response.status().as_u16()
            ));
            error!("{}", stt_error);
            return Err(stt_error);
        }
        Ok(Err(e)) => {
            let stt_error = STTError::ConnectFailure(format!("Handshake failed: {e}"));
            error!("{}", stt_error);
            return Err(stt_error);
        }
        Err(_) => {
            let stt_error = STTError::ConnectFailure(format!(
                "Handshake timed out after {}ms",
                connect_timeout.as_millis()
            ));
            error!("{}", stt_error);
            return Err(stt_error);
        }
    };

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        let stt_error = STTError::ConnectFailure(format!(
            "Handshake returned HTTP {} instead of 101",
            response.status().as_u16()
        ));
        error!("{}", stt_error);
        return Err(stt_error);
    }

    debug!("Handshake response headers: {:?}", response.headers());
    info!("Streaming connection open");

    Ok(Connection { url, stream })
}

/// The process-wide rustls provider; a second install is a harmless no-op.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
