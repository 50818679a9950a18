//! Latest-value push distribution.
//!
//! A [`Broadcast`] is a monitor over the most recent payload and a sequence number.
//! Publishing replaces the payload and bumps the sequence; every session waits until the
//! sequence differs from the one it last sent, then writes whatever payload is current
//! at that moment. Slow sessions skip intermediate payloads instead of queueing them.

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use super::framing::write_frame;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const SESSION_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Latest {
    payload: Option<Arc<Vec<u8>>>,
    seq: u64,
}

/// Mutex/condition monitor guarding the latest payload and its sequence number.
#[derive(Debug, Default)]
pub struct Broadcast {
    latest: Mutex<Latest>,
    changed: Condvar,
    subscribers: AtomicUsize,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest payload and wake every waiting session. Never blocks on I/O.
    pub fn publish(&self, payload: Vec<u8>) -> u64 {
        let mut latest = self.lock();
        latest.payload = Some(Arc::new(payload));
        latest.seq += 1;
        let seq = latest.seq;
        drop(latest);
        self.changed.notify_all();
        seq
    }

    /// Sequence number of the latest payload; 0 before the first publish.
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Block until a payload newer than `last_seen` exists, or `timeout` elapses.
    pub fn wait_newer(&self, last_seen: u64, timeout: Duration) -> Option<(u64, Arc<Vec<u8>>)> {
        let latest = self.lock();
        let (latest, _) = self
            .changed
            .wait_timeout_while(latest, timeout, |l| l.seq == last_seen || l.payload.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if latest.seq == last_seen {
            return None;
        }
        latest.payload.clone().map(|payload| (latest.seq, payload))
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable producer side of a [`Broadcast`].
#[derive(Clone, Debug)]
pub struct Publisher {
    broadcast: Arc<Broadcast>,
}

impl Publisher {
    pub fn new(broadcast: Arc<Broadcast>) -> Self {
        Self { broadcast }
    }

    pub fn publish(&self, payload: Vec<u8>) -> u64 {
        self.broadcast.publish(payload)
    }

    pub fn broadcast(&self) -> &Arc<Broadcast> {
        &self.broadcast
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcast.subscriber_count()
    }
}

pub struct PushServer {
    listener: TcpListener,
    name: &'static str,
}

impl PushServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, name: &'static str) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, name })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the accept loop on a background thread.
    pub fn spawn(self) -> Result<PushHandle> {
        let addr = self.listener.local_addr()?;
        self.listener.set_nonblocking(true)?;

        let broadcast = Arc::new(Broadcast::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let broadcast_thread = broadcast.clone();
        let name = self.name;
        let listener = self.listener;
        let join = std::thread::Builder::new()
            .name(format!("{}-accept", name))
            .spawn(move || run_accept(listener, name, broadcast_thread, shutdown_thread))?;
        log::info!("{} server listening on {}", name, addr);

        Ok(PushHandle {
            addr,
            publisher: Publisher::new(broadcast),
            shutdown,
            join: Some(join),
        })
    }
}

#[derive(Debug)]
pub struct PushHandle {
    pub addr: SocketAddr,
    publisher: Publisher,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PushHandle {
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, payload: Vec<u8>) -> u64 {
        self.publisher.publish(payload)
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// Stop accepting and wait for the accept loop. Sessions end on their next write
    /// failure or once they observe the stop flag while idle.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("push server thread panicked"))?;
        }
        Ok(())
    }
}

/// Source of inbound connections for the accept loop.
trait Accept {
    fn accept_stream(&self) -> std::io::Result<(TcpStream, SocketAddr)>;
}

impl Accept for TcpListener {
    fn accept_stream(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.accept()
    }
}

/// Accepts until shutdown. Accept failures only cost the connection involved; the loop
/// keeps serving new subscribers.
fn run_accept<L: Accept>(
    listener: L,
    name: &'static str,
    broadcast: Arc<Broadcast>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept_stream() {
            Ok((stream, peer)) => {
                if let Err(err) = stream.set_nonblocking(false) {
                    log::warn!("{} dropping {}: {}", name, peer, err);
                    continue;
                }
                let broadcast = broadcast.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("{}-session", name))
                    .spawn(move || run_session(stream, peer, name, broadcast, shutdown));
                if let Err(err) = spawned {
                    log::warn!("{} session for {} not started: {}", name, peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => {
                log::warn!("{} accept failed: {}", name, err);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::debug!("{} accept loop stopped", name);
}

/// Decrements the subscriber count however the session exits.
struct SessionGuard<'a>(&'a Broadcast);

impl<'a> SessionGuard<'a> {
    fn enter(broadcast: &'a Broadcast) -> Self {
        broadcast.subscribers.fetch_add(1, Ordering::SeqCst);
        Self(broadcast)
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    name: &'static str,
    broadcast: Arc<Broadcast>,
    shutdown: Arc<AtomicBool>,
) {
    let _guard = SessionGuard::enter(&broadcast);
    log::info!("{} subscriber connected: {}", name, peer);
    let mut last_seen = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        let Some((seq, payload)) = broadcast.wait_newer(last_seen, SESSION_POLL) else {
            continue;
        };
        if let Err(err) = write_frame(&mut stream, &payload) {
            log::warn!("{} subscriber {} dropped: {}", name, peer, err);
            return;
        }
        last_seen = seq;
    }
    log::debug!("{} session for {} stopped", name, peer);
}
