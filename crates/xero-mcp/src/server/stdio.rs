//! Stdio transport for MCP protocol.
//!
//! Handles newline-delimited JSON-RPC 2.0 over stdin/stdout. Logs go to stderr.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::handler::{ProtocolHandler, codes};
use super::transport::{JsonRpcRequest, JsonRpcResponse};

/// Serve one handler over the process's stdin and stdout.
pub async fn run_stdio(handler: &dyn ProtocolHandler) -> anyhow::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();

    tracing::info!("MCP stdio server ready, waiting for requests...");
    serve(handler, reader, writer).await?;
    handler.close().await;

    Ok(())
}

/// Read requests until EOF, writing one response line per request.
pub async fn serve<R, W>(handler: &dyn ProtocolHandler, mut reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::info!("Stdin closed, shutting down");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => {
                tracing::debug!(method = %request.method, "Received request");
                handler.handle(request).await
            }
            Err(e) => Some(JsonRpcResponse::error(
                None,
                codes::PARSE_ERROR,
                format!("Parse error: {e}"),
            )),
        };

        if let Some(response) = response {
            let mut bytes = serde_json::to_vec(&response)?;
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            writer.flush().await?;
        }
    }

    Ok(())
}
