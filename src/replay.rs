//! Replay: feed a JSON-lines frame log through a session.
//!
//! Blank lines are skipped. Lines that do not parse as a frame, and frames
//! the session refuses, are logged and skipped; replay keeps going.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::frame::{ErrorCode, Frame};
use crate::session::GroupSession;

/// Apply every frame in `reader` to `session`. Returns the number applied.
pub async fn replay<R: AsyncBufRead + Unpin>(session: &mut GroupSession, reader: R) -> usize {
    let mut lines = reader.lines();
    let mut applied = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "input read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping unparsable frame");
                continue;
            }
        };
        match session.handle_frame(&frame) {
            Ok(()) => applied += 1,
            Err(e) => warn!(code = e.error_code(), error = %e, syscall = %frame.syscall, "frame not applied"),
        }
    }
    applied
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
