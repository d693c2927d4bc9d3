/// Stream tee: forward the child's stdout to the terminal while keeping its tail.
///
/// Each chunk is written and flushed as soon as it is read so interactive
/// output is not delayed. Only the bytes after the last `\n` are kept, which
/// is all the control-packet check ever reads, so a long-running child does
/// not grow the buffer. Forwarding is best-effort: the first failed write is
/// logged and forwarding stops, but capture continues until the child closes
/// the stream so the control packet is still seen.
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CHUNK_SIZE: usize = 8192;

/// Copy `reader` into `out` until EOF and return the final unterminated line.
pub async fn tee<R, W>(mut reader: R, mut out: W) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut forwarding = true;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read child stdout");
                break;
            }
        };

        keep_tail(&mut captured, &chunk[..n]);

        if forwarding {
            if let Err(e) = forward(&mut out, &chunk[..n]).await {
                tracing::warn!(error = %e, "failed to forward child stdout, capturing only");
                forwarding = false;
            }
        }
    }

    tracing::debug!(captured_bytes = captured.len(), "child stdout closed");
    captured
}

/// Append `bytes`, dropping everything up to and including the last newline.
fn keep_tail(captured: &mut Vec<u8>, bytes: &[u8]) {
    match bytes.iter().rposition(|&b| b == b'\n') {
        Some(pos) => {
            captured.clear();
            captured.extend_from_slice(&bytes[pos + 1..]);
        }
        None => captured.extend_from_slice(bytes),
    }
}

async fn forward<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes).await?;
    out.flush().await
}
