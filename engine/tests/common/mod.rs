//! A lossy UDP relay used to force specific, deterministic fault patterns
//! (drop sequence N's first transmission, corrupt sequence M's bytes) that a
//! global loss-rate gate can't reproduce on demand. Sits between the
//! `Sender`'s socket and the `Receiver`'s socket and forwards everything
//! except the faults it's configured to inject.

use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use arq_transport::Packet;

/// One-time `flexi_logger` init so `trace!`/`debug!` output from the engine
/// is visible under `--nocapture` when a scenario test needs diagnosing;
/// harmless (and silent) when it isn't.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = flexi_logger::Logger::with_str("warn").start();
    });
}

const POLL_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Default, Clone)]
pub struct RelayConfig {
    /// DATA sequence numbers to drop the very first time they cross
    /// client -> server; retransmissions of the same sequence pass through.
    pub drop_data_once: HashSet<u32>,
    /// DATA sequence numbers to corrupt (flip one payload byte) the first
    /// time they cross client -> server.
    pub corrupt_data_once: HashSet<u32>,
    /// Drop the first SYN the client sends.
    pub drop_first_syn: bool,
}

struct Inner {
    seen_drop: Mutex<HashSet<u32>>,
    seen_corrupt: Mutex<HashSet<u32>>,
    syn_dropped: AtomicBool,
    running: AtomicBool,
    client_addr: Mutex<Option<SocketAddr>>,
}

/// A running relay. Drop to stop its background threads.
pub struct Relay {
    pub client_facing_addr: SocketAddr,
    inner: Arc<Inner>,
}

impl Relay {
    pub fn spawn(server_addr: SocketAddr, cfg: RelayConfig) -> Relay {
        let down = UdpSocket::bind("127.0.0.1:0").unwrap();
        let up = UdpSocket::bind("127.0.0.1:0").unwrap();
        down.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
        up.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
        let client_facing_addr = down.local_addr().unwrap();

        let inner = Arc::new(Inner {
            seen_drop: Mutex::new(HashSet::new()),
            seen_corrupt: Mutex::new(HashSet::new()),
            syn_dropped: AtomicBool::new(false),
            running: AtomicBool::new(true),
            client_addr: Mutex::new(None),
        });

        {
            let inner = inner.clone();
            let cfg = cfg.clone();
            let down = down.try_clone().unwrap();
            let up = up.try_clone().unwrap();
            thread::spawn(move || relay_downstream(down, up, server_addr, inner, cfg));
        }
        {
            let inner = inner.clone();
            let down = down.try_clone().unwrap();
            let up = up.try_clone().unwrap();
            thread::spawn(move || relay_upstream(up, down, inner));
        }

        Relay { client_facing_addr, inner }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

/// client -> relay -> server, applying the configured faults.
fn relay_downstream(
    down: UdpSocket,
    up: UdpSocket,
    server_addr: SocketAddr,
    inner: Arc<Inner>,
    cfg: RelayConfig,
) {
    let mut buf = [0u8; 2048];
    while inner.running.load(Ordering::SeqCst) {
        let (n, from) = match down.recv_from(&mut buf) {
            Ok(v) => v,
            Err(_) => continue,
        };
        *inner.client_addr.lock().unwrap() = Some(from);

        let payload = &buf[..n];
        let forward = match Packet::decode(payload) {
            Ok(p) if p.is_syn() && !p.is_ack() && cfg.drop_first_syn => {
                if inner.syn_dropped.swap(true, Ordering::SeqCst) {
                    Some(payload.to_vec())
                } else {
                    None
                }
            }
            Ok(p) if p.is_data() && cfg.drop_data_once.contains(&p.seq_no) => {
                let mut seen = inner.seen_drop.lock().unwrap();
                if seen.insert(p.seq_no) {
                    None
                } else {
                    Some(payload.to_vec())
                }
            }
            Ok(p) if p.is_data() && cfg.corrupt_data_once.contains(&p.seq_no) => {
                let mut seen = inner.seen_corrupt.lock().unwrap();
                if seen.insert(p.seq_no) {
                    let mut bytes = payload.to_vec();
                    let flip_at = bytes.len() - 1;
                    bytes[flip_at] ^= 0xFF;
                    Some(bytes)
                } else {
                    Some(payload.to_vec())
                }
            }
            _ => Some(payload.to_vec()),
        };

        if let Some(bytes) = forward {
            let _ = up.send_to(&bytes, server_addr);
        }
    }
}

/// server -> relay -> client, unconditionally forwarded.
fn relay_upstream(up: UdpSocket, down: UdpSocket, inner: Arc<Inner>) {
    let mut buf = [0u8; 2048];
    while inner.running.load(Ordering::SeqCst) {
        let n = match up.recv_from(&mut buf) {
            Ok((n, _from)) => n,
            Err(_) => continue,
        };
        if let Some(client_addr) = *inner.client_addr.lock().unwrap() {
            let _ = down.send_to(&buf[..n], client_addr);
        }
    }
}
