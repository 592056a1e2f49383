//! Stdio transport: requests on stdin, responses on stdout, logs on stderr.

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::ProtocolHandler;
use crate::types::{JsonRpcError, McpResult};

use super::framing;

pub struct StdioTransport {
    handler: ProtocolHandler,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler }
    }

    /// Serve until stdin closes. Messages are handled one at a time.
    pub async fn run(&self) -> McpResult<()> {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        tracing::info!("stdio transport started");

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::info!("stdin closed, shutting down");
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            let reply = match framing::parse_message(&line) {
                Ok(msg) => self.handler.handle_message(msg).await,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable message");
                    serde_json::to_value(JsonRpcError::unaddressed(e.code(), e.to_string())).ok()
                }
            };

            if let Some(reply) = reply {
                write_line(&mut stdout, &framing::frame_message(&reply)?).await?;
            }
        }

        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> McpResult<()> {
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
