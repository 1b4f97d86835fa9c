use std::path::Path;

use tracing::{info, warn};

use crate::chat::{ChannelId, ChatBackend, ChatConnection, TransportError};
use crate::paginate::MAX_MESSAGE_LEN;

/// Sends one plain-text message to the operator channel on its own short-lived
/// connection, independent of any curation session. Overlong messages are
/// cut to the platform limit.
pub async fn notify<B: ChatBackend>(
    backend: &B,
    channel: &ChannelId,
    message: &str,
) -> Result<(), TransportError> {
    deliver(backend, channel, message, None).await
}

/// Like [`notify`], followed by `file` as an attachment.
pub async fn notify_with_file<B: ChatBackend>(
    backend: &B,
    channel: &ChannelId,
    message: &str,
    file: &Path,
) -> Result<(), TransportError> {
    deliver(backend, channel, message, Some(file)).await
}

async fn deliver<B: ChatBackend>(
    backend: &B,
    channel: &ChannelId,
    message: &str,
    file: Option<&Path>,
) -> Result<(), TransportError> {
    let message: String = message.chars().take(MAX_MESSAGE_LEN).collect();
    let mut conn = backend.connect(channel).await?;
    let sent = send(&mut conn, &message, file).await;
    if let Err(e) = conn.close().await {
        warn!("Failed to close notification connection: {}", e);
    }
    sent?;
    info!("Notified operator channel: {}", message);
    Ok(())
}

async fn send<C: ChatConnection>(
    conn: &mut C,
    message: &str,
    file: Option<&Path>,
) -> Result<(), TransportError> {
    conn.send_text(message).await?;
    if let Some(file) = file {
        conn.send_file(file).await?;
    }
    Ok(())
}
