//! Per-discipline admission policy and delivery ordering for inbound data
//! segments.

use std::collections::BTreeMap;

use crate::seq::SeqNo;
use crate::send_window::Protocol;

pub struct ReceiveBuffer {
    protocol: Protocol,
    expected: SeqNo,
    /// Receive window width; bounds how far ahead of `expected` a Selective
    /// Repeat arrival may be buffered. Unused by the cumulative disciplines,
    /// which never buffer anything.
    window_size: u32,
    /// Out-of-order arrivals held until the gap in front of them closes.
    /// Selective Repeat is the only discipline that ever populates this —
    /// Stop-and-Wait and Go-Back-N receivers discard anything out of order.
    pending: BTreeMap<u32, Vec<u8>>,
}

/// Outcome of admitting one inbound data segment.
pub struct Admission {
    /// Newly in-order bytes ready for delivery to the byte-stream sink, in
    /// the order they must be written.
    pub deliverable: Vec<Vec<u8>>,
    /// The ack number the caller should send back for this segment
    /// (cumulative for Stop-and-Wait/Go-Back-N, per-segment for Selective
    /// Repeat).
    pub ack_no: SeqNo,
    /// A re-ack of a segment already delivered (or, for Selective Repeat,
    /// already buffered) — counted as `duplicate_arrivals`.
    pub duplicate: bool,
    /// A segment ahead of `expected_seq` that this discipline has to
    /// discard rather than buffer (Stop-and-Wait/Go-Back-N only — Selective
    /// Repeat buffers these instead, so it never sets this).
    pub out_of_order: bool,
}

impl ReceiveBuffer {
    pub fn new(protocol: Protocol, expected: SeqNo, window_size: u32) -> Self {
        ReceiveBuffer {
            protocol,
            expected,
            window_size,
            pending: BTreeMap::new(),
        }
    }

    pub fn expected(&self) -> SeqNo {
        self.expected
    }

    /// Admit one decoded data segment. `seq` is the segment's sequence
    /// number, `payload` its bytes. Returns `None` when the discipline's
    /// policy is to drop the segment with no ACK at all (Selective Repeat
    /// arrivals beyond the receive window).
    pub fn admit(&mut self, seq: SeqNo, payload: Vec<u8>) -> Option<Admission> {
        match self.protocol {
            Protocol::StopWait | Protocol::GoBackN => Some(self.admit_cumulative(seq, payload)),
            Protocol::SelectiveRepeat => self.admit_selective(seq, payload),
        }
    }

    /// Stop-and-Wait / Go-Back-N: only the next expected segment is ever
    /// accepted; anything else (early or a duplicate of something already
    /// delivered) is acked again with the current cumulative ack and
    /// otherwise dropped.
    fn admit_cumulative(&mut self, seq: SeqNo, payload: Vec<u8>) -> Admission {
        if seq == self.expected {
            self.expected = self.expected.advance(1);
            Admission {
                deliverable: vec![payload],
                ack_no: self.expected,
                duplicate: false,
                out_of_order: false,
            }
        } else {
            Admission {
                deliverable: Vec::new(),
                ack_no: self.expected,
                duplicate: true,
                out_of_order: seq > self.expected,
            }
        }
    }

    /// Selective Repeat: a segment within `[expected, expected+window_size)`
    /// is buffered (idempotently) and acked; one below `expected` is a
    /// repeat of something already delivered and is still acked, to repair
    /// a lost ACK on the sender's side; anything further ahead than the
    /// window is dropped with no ACK at all. Runs of consecutive sequence
    /// numbers starting at `expected` drain into the deliverable set in
    /// order.
    fn admit_selective(&mut self, seq: SeqNo, payload: Vec<u8>) -> Option<Admission> {
        if seq < self.expected {
            return Some(Admission {
                deliverable: Vec::new(),
                ack_no: seq.advance(1),
                duplicate: true,
                out_of_order: false,
            });
        }
        if self.expected.distance_to(seq) >= self.window_size {
            return None;
        }

        let duplicate = self.pending.contains_key(&seq.value());
        self.pending.insert(seq.value(), payload);

        let mut deliverable = Vec::new();
        while let Some(bytes) = self.pending.remove(&self.expected.value()) {
            deliverable.push(bytes);
            self.expected = self.expected.advance(1);
        }

        Some(Admission {
            deliverable,
            // Per-segment ACKs carry `ack_no = seq + 1`, same "next
            // expected for this one segment" convention the cumulative
            // disciplines use for the whole stream.
            ack_no: seq.advance(1),
            duplicate,
            out_of_order: false,
        })
    }
}
