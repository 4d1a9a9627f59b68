//! Wire framing.
//!
//! Every reply is one UTF-8 line. Output captured while a command ran is
//! sent first, verbatim, behind [`CAPTURED_OUTPUT_TAG`].

use evalserve_session::Frame;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Prefix of a captured-output frame. Existing clients match on this
/// exact text.
pub const CAPTURED_OUTPUT_TAG: &str = "[PYTHON_PRINT]";

/// Bytes sent for one frame.
#[must_use]
pub fn encode(frame: &Frame) -> String {
    match frame {
        Frame::Captured(text) => format!("{CAPTURED_OUTPUT_TAG}{text}"),
        Frame::Line(text) => format!("{text}\n"),
    }
}

/// Write frames in order and flush.
///
/// # Errors
/// Returns the underlying I/O error; the connection should be dropped.
pub async fn write_frames<W>(writer: &mut W, frames: &[Frame]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in frames {
        writer.write_all(encode(frame).as_bytes()).await?;
    }
    writer.flush().await
}
