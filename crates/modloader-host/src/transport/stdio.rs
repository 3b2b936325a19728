//! Stdio transport: reads JSON-RPC from stdin, writes responses and
//! notifications to stdout through a single writer.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::protocol::ProtocolHandler;
use crate::types::{HostError, HostResult, JsonRpcNotification, RequestId};

use super::framing;

pub struct StdioTransport {
    handler: ProtocolHandler,
    notifications: Option<mpsc::UnboundedReceiver<JsonRpcNotification>>,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self {
            handler,
            notifications: None,
        }
    }

    /// Interleave server-initiated notifications with responses.
    pub fn with_notifications(
        mut self,
        rx: mpsc::UnboundedReceiver<JsonRpcNotification>,
    ) -> Self {
        self.notifications = Some(rx);
        self
    }

    /// Run over the process's stdin and stdout.
    pub async fn run(self) -> HostResult<()> {
        self.run_on(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Run until EOF on `reader` or a `shutdown` request.
    pub async fn run_on<R, W>(mut self, reader: R, mut writer: W) -> HostResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut notifications = self.notifications.take();

        tracing::info!("Stdio transport started");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::info!("EOF on stdin, shutting down");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let reply = match framing::parse_message(&line) {
                        Ok(msg) => self.handler.handle_message(msg).await,
                        Err(e) => {
                            tracing::warn!("Parse error: {e}");
                            Some(parse_error_response(&e)?)
                        }
                    };
                    if let Some(reply) = reply {
                        write_value(&mut writer, &reply).await?;
                    }
                    if self.handler.is_shutdown() {
                        break;
                    }
                }
                Some(notification) = recv(&mut notifications) => {
                    let value = serde_json::to_value(notification)?;
                    write_value(&mut writer, &value).await?;
                }
            }
        }

        // Flush anything queued while the last request ran.
        if let Some(rx) = notifications.as_mut() {
            while let Ok(notification) = rx.try_recv() {
                write_value(&mut writer, &serde_json::to_value(notification)?).await?;
            }
        }

        Ok(())
    }
}

async fn recv(
    rx: &mut Option<mpsc::UnboundedReceiver<JsonRpcNotification>>,
) -> Option<JsonRpcNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn parse_error_response(e: &HostError) -> HostResult<serde_json::Value> {
    let response = e.to_json_rpc_error(RequestId::Null);
    serde_json::to_value(response).map_err(|e| HostError::InternalError(e.to_string()))
}

async fn write_value<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: &serde_json::Value,
) -> HostResult<()> {
    let framed = framing::frame_message(value)?;
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
