use axum::extract::ws::{Message, WebSocket};
use futures_util::{stream::SplitSink, SinkExt};
use traitor_protocol::frames::DebugFrame;

pub type Sink = SplitSink<WebSocket, Message>;

/// Send one debug frame as a JSON text message.
pub async fn frame(tx: &mut Sink, frame: &DebugFrame) -> Result<(), axum::Error> {
    tx.send(Message::Text(frame.to_json().into())).await
}

/// Close the connection; the peer may already be gone.
pub async fn close(tx: &mut Sink) {
    let _ = tx.send(Message::Close(None)).await;
    let _ = tx.close().await;
}
