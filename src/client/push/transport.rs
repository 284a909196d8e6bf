//! # Push Channel Transport
//!
//! Transport abstraction for the push channel. The channel only ever
//! consumes a stream of text frames, so a transport is exactly that: a boxed
//! stream of `Result<String, SyncError>` that ends when the connection
//! closes. The factory is injected through the composition root, letting
//! tests script connections and frames without any networking.

use crate::shared::error::SyncError;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Incoming text frames from an established connection
pub type TransportStream = BoxStream<'static, Result<String, SyncError>>;

/// Opens push channel connections
pub trait TransportFactory: Send + Sync {
    /// Establish a connection to the push endpoint
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportStream, SyncError>>;
}

/// Production transport over a WebSocket connection
#[derive(Debug, Clone, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportStream, SyncError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| SyncError::transport(format!("websocket connect failed: {e}")))?;
            let frames = socket.filter_map(|frame| async move {
                match frame {
                    Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                    // Control and binary frames carry no notifications
                    Ok(_) => None,
                    Err(e) => Some(Err(SyncError::transport(format!(
                        "websocket read failed: {e}"
                    )))),
                }
            });
            Ok(frames.boxed() as TransportStream)
        })
    }
}
