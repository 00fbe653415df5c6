//! The connection state machine and the `Sender`/`Receiver` endpoint types
//! that host the connection's concurrent flows: a transmitter, an ACK
//! receiver, and a background timer scanner on the send side, and a single
//! receive loop on the other, each running on its own `std::thread`.

use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver as ChanReceiver, Sender as ChanSender};
use log::{debug, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::congestion::CongestionController;
use crate::error::{CodecError, ProtocolError, Result};
use crate::events::{EventKind, EventLog};
use crate::loss::LossInjector;
use crate::packet::{Flags, Packet, HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::receive_buffer::ReceiveBuffer;
use crate::send_window::{Protocol, SendWindow};
use crate::seq::SeqNo;
use crate::stats::{Stats, StatusSnapshot};

/// The sender's connection lifecycle. The receiver tracks an analogous
/// lifecycle implicitly (buffer reset on SYN, commit on FIN) rather than
/// exposing its own enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum ConnectionState {
    #[display(fmt = "idle")]
    Idle,
    #[display(fmt = "connecting")]
    Connecting,
    #[display(fmt = "connected")]
    Connected,
    #[display(fmt = "transferring")]
    Transferring,
    #[display(fmt = "closing")]
    Closing,
    #[display(fmt = "completed")]
    Completed,
    #[display(fmt = "error")]
    Error,
}

const TIMER_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SOCKET_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const RECV_BUF_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

fn recv_buf() -> [u8; RECV_BUF_LEN] {
    [0u8; RECV_BUF_LEN]
}

/// Per-transfer fragmentation and send-window state, reset on each `send()`
/// call (mirrors `UDPClient.send_data`'s reset of `base`/`next_seq`/
/// `sent_packets`/`acked_packets` before a new transfer starts).
struct Transfer {
    window: SendWindow,
    chunks: Vec<Vec<u8>>,
    cursor: usize,
    total_chunks: usize,
}

impl Transfer {
    fn new(protocol: Protocol, window_size: u32, max_retries: u32, payload: &[u8]) -> Self {
        let chunks: Vec<Vec<u8>> = if payload.is_empty() {
            Vec::new()
        } else {
            payload.chunks(MAX_PAYLOAD_LEN).map(|c| c.to_vec()).collect()
        };
        let total_chunks = chunks.len();
        Transfer {
            window: SendWindow::new(protocol, SeqNo::new(0), window_size, max_retries),
            chunks,
            cursor: 0,
            total_chunks,
        }
    }

    fn all_acked(&self) -> bool {
        self.window.base().value() as usize >= self.total_chunks
    }
}

struct SenderShared {
    config: Config,
    protocol: Protocol,
    socket: UdpSocket,
    state: Mutex<ConnectionState>,
    transfer: Mutex<Option<Transfer>>,
    congestion: Mutex<CongestionController>,
    stats: Mutex<Stats>,
    events: Mutex<EventLog>,
    loss: Mutex<LossInjector<StdRng>>,
    running: AtomicBool,
    last_error: Mutex<Option<ProtocolError>>,
}

/// The sending endpoint: three concurrent flows (transmitter, ACK receiver,
/// timer scanner) driving a `SendWindow` + `CongestionController` pair over
/// a connected `UdpSocket`. Cheap to clone — clones share the same
/// underlying state, the way handing a thread an `Arc` does.
#[derive(Clone)]
pub struct Sender {
    shared: Arc<SenderShared>,
}

impl Sender {
    /// `socket` must already be connected to the receiver
    /// (`UdpSocket::connect`) — this engine is single-peer, so there is no
    /// per-packet destination to track on the send side.
    pub fn new(socket: UdpSocket, config: Config) -> Self {
        let protocol = config.protocol_mode;
        let congestion_enabled = config.congestion_enabled;
        let timeout = config.timeout;
        Sender {
            shared: Arc::new(SenderShared {
                protocol,
                socket,
                state: Mutex::new(ConnectionState::Idle),
                transfer: Mutex::new(None),
                congestion: Mutex::new(CongestionController::new(congestion_enabled, timeout)),
                stats: Mutex::new(Stats::default()),
                events: Mutex::new(EventLog::default()),
                loss: Mutex::new(LossInjector::new(
                    StdRng::seed_from_u64(rand::random()),
                    config.packet_loss_rate,
                )),
                running: AtomicBool::new(false),
                last_error: Mutex::new(None),
                config,
            }),
        }
    }

    /// Seed the loss injector deterministically, for reproducible tests.
    pub fn with_seed(socket: UdpSocket, config: Config, seed: u64) -> Self {
        let s = Self::new(socket, config);
        *s.shared.loss.lock().unwrap() = LossInjector::new(
            StdRng::seed_from_u64(seed),
            s.shared.config.packet_loss_rate,
        );
        s
    }

    fn log(&self, kind: EventKind, message: impl Into<String>) {
        self.shared.events.lock().unwrap().push(kind, message);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.lock().unwrap() = state;
    }

    fn send_packet(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode().map_err(crate::error::Error::Codec)?;
        self.shared.socket.send(&bytes)?;
        Ok(())
    }

    /// Three-way handshake: SYN, await SYN+ACK, reply ACK. Bounded retry;
    /// exhaustion is `HandshakeFailed`.
    pub fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        let window = self.shared.protocol.effective_window(self.shared.config.window_size) as u16;
        self.shared.socket.set_read_timeout(Some(self.shared.config.timeout))?;

        let mut buf = recv_buf();
        for attempt in 0..self.shared.config.handshake_retries {
            self.send_packet(&Packet::syn(0, window))?;
            self.log(EventKind::SynSent, format!("SYN sent (attempt {})", attempt + 1));

            match self.shared.socket.recv(&mut buf) {
                Ok(n) => {
                    if let Ok(p) = Packet::decode(&buf[..n]) {
                        if p.is_syn() && p.is_ack() {
                            self.log(EventKind::SynAckReceived, "SYN-ACK received");
                            let ack = Packet::ack(p.seq_no.wrapping_add(1), window);
                            self.send_packet(&ack)?;
                            self.set_state(ConnectionState::Connected);
                            return Ok(());
                        }
                    }
                }
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.set_state(ConnectionState::Error);
        self.log(EventKind::Error, "handshake failed: retries exhausted");
        Err(ProtocolError::HandshakeFailed.into())
    }

    /// Send `data` reliably to the connected peer, blocking until the
    /// transfer completes or aborts. Connects first if not already
    /// connected, mirroring `UDPClient.send_data`'s `connect()`-on-demand.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if *self.shared.state.lock().unwrap() == ConnectionState::Idle {
            self.connect()?;
        }

        *self.shared.transfer.lock().unwrap() = Some(Transfer::new(
            self.shared.protocol,
            self.shared.config.window_size,
            self.shared.config.max_retries,
            data,
        ));
        *self.shared.stats.lock().unwrap() = Stats::default();
        *self.shared.congestion.lock().unwrap() = CongestionController::new(
            self.shared.config.congestion_enabled,
            self.shared.config.timeout,
        );
        *self.shared.last_error.lock().unwrap() = None;
        self.set_state(ConnectionState::Transferring);
        self.shared.running.store(true, Ordering::SeqCst);

        let (notify_tx, notify_rx) = bounded::<()>(1);

        let tx_handle = {
            let sender = self.clone();
            let notify_rx = notify_rx;
            thread::spawn(move || sender.transmitter_loop(notify_rx))
        };
        let ack_handle = {
            let sender = self.clone();
            let notify_tx = notify_tx.clone();
            thread::spawn(move || sender.ack_receiver_loop(notify_tx))
        };
        let timer_handle = {
            let sender = self.clone();
            thread::spawn(move || sender.timer_scanner_loop(notify_tx))
        };

        tx_handle.join().expect("transmitter thread panicked");
        ack_handle.join().expect("ack receiver thread panicked");
        timer_handle.join().expect("timer scanner thread panicked");

        self.shared.running.store(false, Ordering::SeqCst);

        if *self.shared.state.lock().unwrap() == ConnectionState::Error {
            let err = self
                .shared
                .last_error
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(ProtocolError::HandshakeFailed);
            return Err(err.into());
        }

        self.teardown()
    }

    /// Application-driven transmitter: fragments already produced by
    /// `send()`'s `Transfer::new` are admitted into the send window as room
    /// frees up, parked on `notify_rx` between checks instead of busy-waiting
    /// (the Python original's `time.sleep(0.001)` equivalent).
    fn transmitter_loop(&self, notify_rx: ChanReceiver<()>) {
        loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                return;
            }

            let done_pushing = {
                let mut guard = self.shared.transfer.lock().unwrap();
                let transfer = match guard.as_mut() {
                    Some(t) => t,
                    None => return,
                };
                self.push_ready_fragments(transfer);
                transfer.cursor >= transfer.total_chunks
            };

            if done_pushing {
                return;
            }
            let _ = notify_rx.recv_timeout(TIMER_POLL_INTERVAL);
        }
    }

    fn push_ready_fragments(&self, transfer: &mut Transfer) {
        let window_adv = self.shared.protocol.effective_window(self.shared.config.window_size) as u16;
        loop {
            let effective = self.shared.congestion.lock().unwrap().window();
            if transfer.cursor >= transfer.total_chunks || !transfer.window.has_room(effective) {
                break;
            }
            let seq = transfer.window.next_seq();
            let payload = transfer.chunks[transfer.cursor].clone();
            let packet = Packet::data(seq.value(), window_adv, payload.clone());
            let now = Instant::now();

            if self.shared.loss.lock().unwrap().should_drop() {
                self.shared.stats.lock().unwrap().packets_dropped += 1;
                self.log(EventKind::PacketDrop, format!("dropped outgoing seq={}", seq));
            } else if let Ok(bytes) = packet.encode() {
                let _ = self.shared.socket.send(&bytes);
                trace!("sent DATA seq={}", seq);
            }

            self.shared.congestion.lock().unwrap().on_packet_sent();
            transfer.window.push(seq, packet, now);
            transfer.cursor += 1;

            let mut stats = self.shared.stats.lock().unwrap();
            stats.packets_sent += 1;
            stats.bytes_transferred += payload.len() as u64;
            drop(stats);
            self.log(EventKind::PacketSent, format!("DATA seq={}", seq));
        }
    }

    /// ACK-receiving flow: drains the socket, advances the send window and
    /// congestion controller in that order, wakes the transmitter when room
    /// frees up.
    fn ack_receiver_loop(&self, notify_tx: ChanSender<()>) {
        let _ = self.shared.socket.set_read_timeout(Some(SOCKET_POLL_TIMEOUT));
        let mut buf = recv_buf();

        while self.shared.running.load(Ordering::SeqCst) {
            let n = match self.shared.socket.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => continue,
                Err(_) => continue,
            };

            if self.shared.loss.lock().unwrap().should_drop() {
                continue;
            }

            match Packet::decode(&buf[..n]) {
                Ok(p) if p.is_ack() && !p.is_fin() => self.handle_ack(&p, &notify_tx),
                Ok(p) if p.is_fin() && p.is_ack() => {
                    self.log(EventKind::FinAckReceived, "FIN-ACK received (mid-transfer)");
                }
                Ok(_) => {}
                Err(CodecError::ChecksumError) => {
                    self.shared.stats.lock().unwrap().checksum_errors += 1;
                    self.log(EventKind::ChecksumError, "checksum mismatch on inbound packet");
                }
                Err(_) => {}
            }
        }
    }

    fn handle_ack(&self, packet: &Packet, notify_tx: &ChanSender<()>) {
        self.shared.stats.lock().unwrap().acks_received += 1;
        self.log(EventKind::AckReceived, format!("ACK {}", packet.ack_no));

        let now = Instant::now();
        let (rtt, complete) = {
            let mut guard = self.shared.transfer.lock().unwrap();
            let transfer = match guard.as_mut() {
                Some(t) => t,
                None => return,
            };
            let rtt = transfer.window.on_ack(SeqNo::new(packet.ack_no), now);
            (rtt, transfer.all_acked())
        };

        if let Some(sample) = rtt {
            self.shared.stats.lock().unwrap().record_rtt(sample);
        }
        // Send window advances before the congestion controller updates, so
        // observers never see `packets_in_flight` inconsistent with `base`
        // — `rtt`/`complete` were already read from the post-advance window
        // above.
        self.shared.congestion.lock().unwrap().on_ack_received(rtt);

        let _ = notify_tx.try_send(());
        if complete {
            self.shared.running.store(false, Ordering::SeqCst);
        }
    }

    /// Timer scanner: polls at ≈20 Hz, fires retransmissions through the
    /// send window's own per-protocol policy, and aborts the transfer once
    /// the retry cap is exceeded.
    fn timer_scanner_loop(&self, notify_tx: ChanSender<()>) {
        while self.shared.running.load(Ordering::SeqCst) {
            thread::sleep(TIMER_POLL_INTERVAL);
            if !self.shared.running.load(Ordering::SeqCst) {
                return;
            }

            let rto = self.shared.congestion.lock().unwrap().rto();
            let now = Instant::now();
            let outcome = {
                let mut guard = self.shared.transfer.lock().unwrap();
                let transfer = match guard.as_mut() {
                    Some(t) => t,
                    None => continue,
                };
                transfer.window.check_timeouts(now, rto)
            };

            match outcome {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    for r in &batch {
                        if self.shared.loss.lock().unwrap().should_drop() {
                            self.shared.stats.lock().unwrap().packets_dropped += 1;
                        } else if let Ok(bytes) = r.packet.encode() {
                            let _ = self.shared.socket.send(&bytes);
                        }
                        self.shared.stats.lock().unwrap().retransmissions += 1;
                        self.log(EventKind::Retransmit, format!("retransmit seq={}", r.seq));
                    }
                    self.shared.stats.lock().unwrap().timeouts += 1;
                    self.log(EventKind::Timeout, format!("timeout, {} segment(s) retransmitted", batch.len()));
                    self.shared.congestion.lock().unwrap().on_timeout();
                    let _ = notify_tx.try_send(());
                }
                Err(ProtocolError::TransferAborted { seq }) => {
                    warn!("transfer aborted: retry cap exceeded for seq={}", seq);
                    self.log(EventKind::Error, format!("transfer aborted: retry cap exceeded for seq={}", seq));
                    *self.shared.last_error.lock().unwrap() =
                        Some(ProtocolError::TransferAborted { seq });
                    self.set_state(ConnectionState::Error);
                    self.shared.running.store(false, Ordering::SeqCst);
                    return;
                }
                Err(_) => {}
            }
        }
    }

    /// Teardown: FIN after every payload is acked, bounded wait for FIN+ACK.
    /// Absence is logged but does not fail the transfer — the data is
    /// already delivered.
    fn teardown(&self) -> Result<()> {
        self.set_state(ConnectionState::Closing);
        let next_seq = self
            .shared
            .transfer
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| t.window.next_seq().value())
            .unwrap_or(0);

        self.send_packet(&Packet::fin(next_seq))?;
        self.log(EventKind::FinSent, "FIN sent");

        self.shared.socket.set_read_timeout(Some(self.shared.config.fin_wait))?;
        let mut buf = recv_buf();
        match self.shared.socket.recv(&mut buf) {
            Ok(n) => match Packet::decode(&buf[..n]) {
                Ok(p) if p.is_fin() && p.is_ack() => {
                    self.log(EventKind::FinAckReceived, "FIN-ACK received");
                }
                _ => self.log(EventKind::Warning, "unexpected reply while awaiting FIN-ACK"),
            },
            Err(e) if is_timeout(&e) => {
                self.log(EventKind::Warning, "FIN-ACK timed out; data already delivered");
            }
            Err(e) => return Err(e.into()),
        }

        self.set_state(ConnectionState::Completed);
        let bytes = self.shared.stats.lock().unwrap().bytes_transferred;
        self.log(EventKind::TransferComplete, format!("transfer complete: {} bytes", bytes));
        Ok(())
    }

    /// Stop the endpoint: clears the running flag so the background flows
    /// exit at their next poll boundary. Does not close the socket — the
    /// caller owns it.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Return to `Idle` with cleared buffers and statistics.
    pub fn reset(&self) {
        self.stop();
        *self.shared.transfer.lock().unwrap() = None;
        *self.shared.stats.lock().unwrap() = Stats::default();
        self.shared.events.lock().unwrap().clear();
        *self.shared.congestion.lock().unwrap() = CongestionController::new(
            self.shared.config.congestion_enabled,
            self.shared.config.timeout,
        );
        self.set_state(ConnectionState::Idle);
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = *self.shared.state.lock().unwrap();
        let transfer = self.shared.transfer.lock().unwrap();
        let (base, next_seq, total_chunks) = match transfer.as_ref() {
            Some(t) => (t.window.base().value(), t.window.next_seq().value(), t.total_chunks),
            None => (0, 0, 0),
        };
        drop(transfer);
        let congestion = self.shared.congestion.lock().unwrap();
        StatusSnapshot {
            state,
            base,
            next_seq,
            total_chunks,
            window_size: self.shared.protocol.effective_window(self.shared.config.window_size),
            cwnd: congestion.window(),
            ssthresh: congestion.ssthresh(),
            rto: congestion.rto(),
            in_slow_start: congestion.in_slow_start(),
            stats: self.shared.stats.lock().unwrap().snapshot(),
        }
    }

    pub fn events(&self, n: usize) -> Vec<crate::events::EventRecord> {
        self.shared.events.lock().unwrap().snapshot(n)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

struct ReceiverShared {
    socket: UdpSocket,
    protocol: Protocol,
    window_size: u32,
    config: Config,
    sink: Mutex<Box<dyn Write + Send>>,
    state: Mutex<ConnectionState>,
    buffer: Mutex<Option<ReceiveBuffer>>,
    stats: Mutex<Stats>,
    events: Mutex<EventLog>,
    loss: Mutex<LossInjector<StdRng>>,
    running: AtomicBool,
    peer: Mutex<Option<SocketAddr>>,
}

/// The receiving endpoint: a single flow draining the socket, admitting DATA
/// segments through a `ReceiveBuffer` and flushing reassembled bytes to the
/// caller-supplied sink in order.
#[derive(Clone)]
pub struct Receiver {
    shared: Arc<ReceiverShared>,
}

impl Receiver {
    pub fn new(socket: UdpSocket, config: Config, sink: Box<dyn Write + Send>) -> Self {
        let protocol = config.protocol_mode;
        let window_size = protocol.effective_window(config.window_size);
        let loss_rate = config.packet_loss_rate;
        Receiver {
            shared: Arc::new(ReceiverShared {
                socket,
                protocol,
                window_size,
                sink: Mutex::new(sink),
                state: Mutex::new(ConnectionState::Idle),
                buffer: Mutex::new(None),
                stats: Mutex::new(Stats::default()),
                events: Mutex::new(EventLog::default()),
                loss: Mutex::new(LossInjector::new(StdRng::seed_from_u64(rand::random()), loss_rate)),
                running: AtomicBool::new(false),
                peer: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn with_seed(socket: UdpSocket, config: Config, sink: Box<dyn Write + Send>, seed: u64) -> Self {
        let r = Self::new(socket, config, sink);
        let rate = r.shared.config.packet_loss_rate;
        *r.shared.loss.lock().unwrap() = LossInjector::new(StdRng::seed_from_u64(seed), rate);
        r
    }

    /// Start the single receive flow in the background. Safe to call once;
    /// subsequent calls are no-ops while already running.
    pub fn start(&self) -> thread::JoinHandle<()> {
        self.shared.running.store(true, Ordering::SeqCst);
        let receiver = self.clone();
        thread::spawn(move || receiver.recv_loop())
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        *self.shared.buffer.lock().unwrap() = None;
        *self.shared.stats.lock().unwrap() = Stats::default();
        self.shared.events.lock().unwrap().clear();
        *self.shared.state.lock().unwrap() = ConnectionState::Idle;
    }

    fn recv_loop(&self) {
        let _ = self.shared.socket.set_read_timeout(Some(SOCKET_POLL_TIMEOUT));
        let mut buf = recv_buf();

        while self.shared.running.load(Ordering::SeqCst) {
            let (n, addr) = match self.shared.socket.recv_from(&mut buf) {
                Ok(v) => v,
                Err(e) if is_timeout(&e) => continue,
                Err(_) => continue,
            };

            if self.shared.loss.lock().unwrap().should_drop() {
                self.shared.stats.lock().unwrap().packets_dropped += 1;
                self.log(EventKind::PacketDrop, format!("dropped inbound from {}", addr));
                continue;
            }

            match Packet::decode(&buf[..n]) {
                Ok(p) => self.handle_packet(p, addr),
                Err(CodecError::ChecksumError) => {
                    self.shared.stats.lock().unwrap().checksum_errors += 1;
                    self.log(EventKind::ChecksumError, "checksum mismatch");
                }
                Err(_) => {}
            }
        }
    }

    fn log(&self, kind: EventKind, message: impl Into<String>) {
        self.shared.events.lock().unwrap().push(kind, message);
    }

    fn send_to(&self, packet: &Packet, addr: SocketAddr) {
        if let Ok(bytes) = packet.encode() {
            let _ = self.shared.socket.send_to(&bytes, addr);
        }
    }

    fn handle_packet(&self, packet: Packet, addr: SocketAddr) {
        *self.shared.peer.lock().unwrap() = Some(addr);
        self.shared.stats.lock().unwrap().packets_received += 1;

        if packet.flags.contains(Flags::SYN) && !packet.flags.contains(Flags::ACK) {
            self.handle_syn(&packet, addr);
        } else if packet.flags.contains(Flags::DATA) {
            self.handle_data(&packet, addr);
        } else if packet.flags.contains(Flags::FIN) {
            self.handle_fin(&packet, addr);
        }
    }

    /// On first SYN, reset connection state entirely.
    fn handle_syn(&self, packet: &Packet, addr: SocketAddr) {
        *self.shared.buffer.lock().unwrap() = Some(ReceiveBuffer::new(
            self.shared.protocol,
            SeqNo::new(0),
            self.shared.window_size,
        ));
        *self.shared.stats.lock().unwrap() = Stats::default();
        *self.shared.state.lock().unwrap() = ConnectionState::Connecting;

        let synack = Packet::syn_ack(0, packet.seq_no.wrapping_add(1), self.shared.window_size as u16);
        self.send_to(&synack, addr);
        self.shared.stats.lock().unwrap().acks_sent += 1;
        self.log(EventKind::AckSent, "SYN-ACK sent");
    }

    fn handle_data(&self, packet: &Packet, addr: SocketAddr) {
        if *self.shared.state.lock().unwrap() == ConnectionState::Connecting {
            *self.shared.state.lock().unwrap() = ConnectionState::Transferring;
        }

        let mut guard = self.shared.buffer.lock().unwrap();
        let buffer = match guard.as_mut() {
            Some(b) => b,
            None => return, // DATA before a SYN: no session to admit into.
        };
        let admission = match buffer.admit(SeqNo::new(packet.seq_no), packet.payload.clone()) {
            Some(a) => a,
            None => return, // beyond the receive window: drop, no ACK.
        };
        drop(guard);

        let mut stats = self.shared.stats.lock().unwrap();
        if admission.duplicate {
            stats.duplicate_arrivals += 1;
        }
        if admission.out_of_order {
            stats.out_of_order += 1;
        }
        drop(stats);

        if !admission.deliverable.is_empty() {
            let mut sink = self.shared.sink.lock().unwrap();
            let mut delivered = 0usize;
            for chunk in &admission.deliverable {
                if sink.write_all(chunk).is_err() {
                    self.log(EventKind::Warning, "sink write failed");
                    break;
                }
                delivered += chunk.len();
            }
            drop(sink);
            self.shared.stats.lock().unwrap().bytes_transferred += delivered as u64;
        }

        let ack = Packet::ack(admission.ack_no.value(), self.shared.window_size as u16);
        self.send_to(&ack, addr);
        self.shared.stats.lock().unwrap().acks_sent += 1;
        debug!("ACK {} sent to {}", admission.ack_no, addr);
        self.log(EventKind::AckSent, format!("ACK {}", admission.ack_no));
    }

    /// Flush the reassembled stream and reply FIN+ACK. The sink is already
    /// fully written to as segments drained in order, so "flush" here means
    /// `Write::flush`, not a final bulk copy.
    fn handle_fin(&self, packet: &Packet, addr: SocketAddr) {
        let _ = self.shared.sink.lock().unwrap().flush();

        let fin_ack = Packet::fin_ack(0, packet.seq_no.wrapping_add(1));
        self.send_to(&fin_ack, addr);
        self.log(EventKind::FinSent, "FIN-ACK sent");

        *self.shared.state.lock().unwrap() = ConnectionState::Completed;
        let bytes = self.shared.stats.lock().unwrap().bytes_transferred;
        self.log(EventKind::TransferComplete, format!("transfer complete: {} bytes", bytes));
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = *self.shared.state.lock().unwrap();
        let expected = self
            .shared
            .buffer
            .lock()
            .unwrap()
            .as_ref()
            .map(|b| b.expected().value())
            .unwrap_or(0);
        StatusSnapshot {
            state,
            base: expected,
            next_seq: expected,
            total_chunks: 0,
            window_size: self.shared.window_size,
            cwnd: self.shared.window_size,
            ssthresh: 0.0,
            rto: Duration::from_secs(0),
            in_slow_start: false,
            stats: self.shared.stats.lock().unwrap().snapshot(),
        }
    }

    pub fn events(&self, n: usize) -> Vec<crate::events::EventRecord> {
        self.shared.events.lock().unwrap().snapshot(n)
    }
}
