//! Streaming frame codec used during `COMMAND_PHASE` raw forwarding.
//!
//! Unlike [`super::packet_reader::PacketReader`], which reassembles a whole
//! logical packet before handing it to a caller, this codec exposes a
//! first-slice-then-raw-bytes view: the first `INLINE_CAP` bytes of a
//! packet's payload are buffered and handed back as one event, and anything
//! beyond that streams through as opaque `Raw` chunks, bounded only by how
//! much the caller fed in. This is what lets the command phase forward
//! multi-megabyte result sets without ever buffering them whole.
//!
//! Nothing in this module performs I/O or suspends; it is pure state over
//! byte slices, which is what lets it run inline on the hot forwarding path.

/// Bytes of a logical packet's payload buffered before switching to raw mode.
pub const INLINE_CAP: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// The first (possibly only) slice of a logical packet's payload.
    /// `complete` is true iff this slice is the entire payload.
    Packet {
        seq: u8,
        payload: Vec<u8>,
        complete: bool,
    },
    /// Raw continuation bytes of the packet most recently announced via
    /// `Packet { complete: false, .. }`.
    Raw(Vec<u8>),
}

#[derive(Debug)]
enum State {
    Header { buf: [u8; 4], have: usize },
    Inline { seq: u8, len: u32, buf: Vec<u8> },
    Raw { remaining: u32 },
}

/// Incremental decoder for the length+sequence packet framing (§4.1).
#[derive(Debug)]
pub struct FrameCodec {
    state: State,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: State::Header {
                buf: [0; 4],
                have: 0,
            },
        }
    }

    /// True while a logical packet's raw tail is still being streamed.
    pub fn in_raw_mode(&self) -> bool {
        matches!(self.state, State::Raw { .. })
    }

    /// Feeds newly-arrived bytes and appends every event they complete.
    /// Always consumes all of `input` (never holds bytes back): the caller
    /// owns reassembly decisions, this only tracks header/payload counters.
    pub fn feed(&mut self, mut input: &[u8], events: &mut Vec<FrameEvent>) {
        while !input.is_empty() {
            match &mut self.state {
                State::Header { buf, have } => {
                    let need = 4 - *have;
                    let take_n = need.min(input.len());
                    buf[*have..*have + take_n].copy_from_slice(&input[..take_n]);
                    *have += take_n;
                    input = &input[take_n..];
                    if *have == 4 {
                        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], 0]);
                        let seq = buf[3];
                        if len == 0 {
                            events.push(FrameEvent::Packet {
                                seq,
                                payload: Vec::new(),
                                complete: true,
                            });
                            self.state = State::Header {
                                buf: [0; 4],
                                have: 0,
                            };
                        } else {
                            self.state = State::Inline {
                                seq,
                                len,
                                buf: Vec::with_capacity((len as usize).min(INLINE_CAP)),
                            };
                        }
                    }
                }
                State::Inline { seq, len, buf } => {
                    let want = ((*len as usize) - buf.len()).min(INLINE_CAP - buf.len());
                    let take_n = want.min(input.len());
                    buf.extend_from_slice(&input[..take_n]);
                    input = &input[take_n..];
                    let inline_full = buf.len() == INLINE_CAP || buf.len() as u32 == *len;
                    if inline_full {
                        let seq_v = *seq;
                        let len_v = *len;
                        let payload = std::mem::take(buf);
                        let complete = payload.len() as u32 == len_v;
                        let remaining = len_v - payload.len() as u32;
                        events.push(FrameEvent::Packet {
                            seq: seq_v,
                            payload,
                            complete,
                        });
                        self.state = if remaining > 0 {
                            State::Raw { remaining }
                        } else {
                            State::Header {
                                buf: [0; 4],
                                have: 0,
                            }
                        };
                    }
                }
                State::Raw { remaining } => {
                    let take_n = (*remaining as usize).min(input.len());
                    events.push(FrameEvent::Raw(input[..take_n].to_vec()));
                    input = &input[take_n..];
                    *remaining -= take_n as u32;
                    if *remaining == 0 {
                        self.state = State::Header {
                            buf: [0; 4],
                            have: 0,
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u8, payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u32;
        let mut out = vec![
            (len & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            ((len >> 16) & 0xFF) as u8,
            seq,
        ];
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn small_packet_decodes_whole() {
        let mut codec = FrameCodec::new();
        let mut events = Vec::new();
        codec.feed(&frame(0, b"hello"), &mut events);
        assert_eq!(
            events,
            vec![FrameEvent::Packet {
                seq: 0,
                payload: b"hello".to_vec(),
                complete: true
            }]
        );
    }

    #[test]
    fn zero_length_payload_is_valid() {
        let mut codec = FrameCodec::new();
        let mut events = Vec::new();
        codec.feed(&frame(7, b""), &mut events);
        assert_eq!(
            events,
            vec![FrameEvent::Packet {
                seq: 7,
                payload: vec![],
                complete: true
            }]
        );
    }

    #[test]
    fn oversized_payload_switches_to_raw() {
        let payload = vec![0xABu8; INLINE_CAP + 200];
        let mut codec = FrameCodec::new();
        let mut events = Vec::new();
        codec.feed(&frame(1, &payload), &mut events);
        assert_eq!(events.len(), 2);
        match &events[0] {
            FrameEvent::Packet {
                seq,
                payload: p,
                complete,
            } => {
                assert_eq!(*seq, 1);
                assert_eq!(p.len(), INLINE_CAP);
                assert!(!complete);
            }
            _ => panic!("expected Packet event"),
        }
        match &events[1] {
            FrameEvent::Raw(bytes) => assert_eq!(bytes.len(), 200),
            _ => panic!("expected Raw event"),
        }
    }

    #[test]
    fn boundary_chunking_is_order_independent() {
        let payload = vec![0x11u8; INLINE_CAP + 50];
        let bytes = frame(3, &payload);

        let mut whole = FrameCodec::new();
        let mut whole_events = Vec::new();
        whole.feed(&bytes, &mut whole_events);

        for split in [1, 2, 4, 5, INLINE_CAP, INLINE_CAP + 3, bytes.len() - 1] {
            let split = split.min(bytes.len());
            let mut chunked = FrameCodec::new();
            let mut chunked_events = Vec::new();
            chunked.feed(&bytes[..split], &mut chunked_events);
            chunked.feed(&bytes[split..], &mut chunked_events);
            assert_eq!(chunked_events, whole_events, "split at {split}");
        }
    }
}
