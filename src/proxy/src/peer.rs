//! Peer (component E): a buffered socket half coupled to the frame codec.
//!
//! Command-phase forwarding never re-serializes anything: bytes read from
//! one side are copied verbatim to the other, header and all. The
//! [`crate::protocol::mysql::packet::codec::FrameCodec`] runs alongside that
//! copy purely as an *inspector* — it tells the caller where packet
//! boundaries and command bytes fall so the connection state machine can
//! track `request_time` and detect the terminating EOF/OK, without ever
//! being on the critical path for whether bytes get forwarded.

use crate::protocol::mysql::packet::codec::{FrameCodec, FrameEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Outcome of one `forward_once` call.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// `n` bytes were copied; `events` describes the packet boundaries seen.
    Forwarded { n: usize, events: Vec<FrameEvent> },
    /// The source half reached EOF.
    Closed,
}

/// One direction of a bidirectional socket pairing.
pub struct Peer<R> {
    reader: R,
    codec: FrameCodec,
}

impl<R: AsyncRead + Unpin> Peer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            codec: FrameCodec::new(),
        }
    }

    /// Reads whatever is available, forwards it verbatim to `dst`, and
    /// returns the packet-boundary events the codec observed in that chunk.
    /// `scratch` is the caller-owned read buffer (sized per §5's resource
    /// policy: 32 KiB steady-state, 4 KiB during small-allocation paths).
    pub async fn forward_once<W: AsyncWrite + Unpin>(
        &mut self,
        dst: &mut W,
        scratch: &mut [u8],
    ) -> std::io::Result<ForwardOutcome> {
        let n = self.reader.read(scratch).await?;
        if n == 0 {
            return Ok(ForwardOutcome::Closed);
        }
        dst.write_all(&scratch[..n]).await?;
        let mut events = Vec::new();
        self.codec.feed(&scratch[..n], &mut events);
        Ok(ForwardOutcome::Forwarded { n, events })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::constants::CommandCode;

    #[tokio::test]
    async fn forwards_bytes_and_reports_command_packet() {
        let mut payload = vec![CommandCode::ComQuery as u8];
        payload.extend_from_slice(b"SELECT 1");
        let len = payload.len() as u32;
        let mut frame = vec![(len & 0xFF) as u8, ((len >> 8) & 0xFF) as u8, 0, 0];
        frame.extend_from_slice(&payload);

        let mut peer = Peer::new(std::io::Cursor::new(frame.clone()));
        let mut dst = Vec::new();
        let mut scratch = [0u8; 4096];
        let outcome = peer.forward_once(&mut dst, &mut scratch).await.unwrap();
        match outcome {
            ForwardOutcome::Forwarded { n, events } => {
                assert_eq!(n, frame.len());
                assert_eq!(events.len(), 1);
            }
            ForwardOutcome::Closed => panic!("expected data"),
        }
        assert_eq!(dst, frame);
    }

    #[tokio::test]
    async fn empty_reader_reports_closed() {
        let mut peer = Peer::new(std::io::Cursor::new(Vec::<u8>::new()));
        let mut dst = Vec::new();
        let mut scratch = [0u8; 16];
        let outcome = peer.forward_once(&mut dst, &mut scratch).await.unwrap();
        assert!(matches!(outcome, ForwardOutcome::Closed));
    }
}
