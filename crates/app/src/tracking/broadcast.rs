//! Broadcast stage and the connected-peer registry.
//!
//! Telemetry goes to the first peer that connected. Anything a peer sends is
//! relayed to the peers after the first one, never back to the sender.

use std::{
    io::Write,
    sync::{Arc, Mutex},
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tracing::{debug, warn};

use super::{
    data::{OutputItem, SharedLatest},
    encoding,
    queue::QueueReceiver,
    shutdown::ShutdownToken,
    telemetry,
};

pub type PeerId = u64;

/// Messages buffered per peer before new ones are dropped.
pub const PEER_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Connected peers in connection order.
///
/// Each peer has a bounded outbox. A peer that stops reading loses new
/// messages; only a closed outbox removes the peer.
#[derive(Debug, Default)]
pub struct PeerHub {
    peers: Vec<(PeerId, Sender<PeerMessage>)>,
    next_id: PeerId,
}

pub type SharedHub = Arc<Mutex<PeerHub>>;

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tx: Sender<PeerMessage>) -> PeerId {
        let id = self.next_id;
        self.next_id += 1;
        self.peers.push((id, tx));
        self.record_count();
        id
    }

    pub fn unregister(&mut self, id: PeerId) -> bool {
        let before = self.peers.len();
        self.peers.retain(|(peer, _)| *peer != id);
        self.record_count();
        self.peers.len() != before
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peer ids in connection order.
    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|(id, _)| *id).collect()
    }

    /// Send to the earliest-connected peer. A peer whose channel is closed is
    /// dropped and the next one becomes primary. Returns false when nobody
    /// is connected or the primary's outbox is full.
    pub fn send_primary(&mut self, message: PeerMessage) -> bool {
        while let Some((id, tx)) = self.peers.first() {
            match tx.try_send(message.clone()) {
                Ok(()) => return true,
                Err(TrySendError::Full(_)) => {
                    record_peer_drop();
                    return false;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = *id, "pruning disconnected primary peer");
                    self.peers.remove(0);
                    self.record_count();
                }
            }
        }
        false
    }

    /// Forward a message from `from` to every peer after the first, except
    /// `from` itself. Returns how many peers received it.
    pub fn relay(&mut self, from: PeerId, message: &PeerMessage) -> usize {
        if self.peers.len() < 2 {
            return 0;
        }
        let mut delivered = 0;
        let mut index = 1;
        while index < self.peers.len() {
            let (id, tx) = &self.peers[index];
            if *id == from {
                index += 1;
                continue;
            }
            match tx.try_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    index += 1;
                }
                Err(TrySendError::Full(_)) => {
                    record_peer_drop();
                    index += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = *id, "pruning disconnected peer");
                    self.peers.remove(index);
                }
            }
        }
        self.record_count();
        delivered
    }

    fn record_count(&self) {
        metrics::gauge!("facecast_peers_connected").set(self.peers.len() as f64);
    }
}

fn record_peer_drop() {
    metrics::counter!("facecast_peer_dropped_total").increment(1);
}

#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    pub annotate: bool,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub frames: u64,
    pub telemetry_delivered: u64,
    pub encode_failures: u64,
}

/// Run the broadcast loop on its own thread until the processing stage is
/// gone and its queue is drained.
///
/// A failed write to `sink` cancels `shutdown` and ends the stage with that
/// error; a failed encode only skips that frame's image.
pub fn spawn_broadcast_stage<W>(
    outputs: QueueReceiver<OutputItem>,
    hub: SharedHub,
    latest: SharedLatest,
    mut sink: W,
    settings: BroadcastSettings,
    shutdown: ShutdownToken,
) -> Result<thread::JoinHandle<Result<BroadcastReport>>>
where
    W: Write + Send + 'static,
{
    telemetry::spawn_thread("facecast-broadcast", move || {
        let _worker = tracing::info_span!(
            "broadcast.worker",
            annotate = settings.annotate,
            quality = settings.jpeg_quality
        )
        .entered();
        let mut report = BroadcastReport::default();

        while let Some(item) = outputs.pop() {
            let _frame = tracing::debug_span!("frame", frame = item.frame_number).entered();
            let started = Instant::now();

            let json = item
                .telemetry
                .to_json()
                .context("failed to serialize telemetry")?;
            let delivered = hub
                .lock()
                .map_err(|_| anyhow!("peer hub poisoned"))?
                .send_primary(PeerMessage::Text(json.clone()));
            if delivered {
                report.telemetry_delivered += 1;
            }

            let overlay = item.overlay.as_ref().filter(|_| settings.annotate);
            let jpeg = match encoding::render_jpeg(&item.frame, overlay, settings.jpeg_quality) {
                Ok(jpeg) => Some(jpeg),
                Err(err) => {
                    warn!("skipping image for frame #{}: {err:#}", item.frame_number);
                    metrics::counter!("facecast_encode_errors_total").increment(1);
                    report.encode_failures += 1;
                    None
                }
            };

            if let Some(jpeg) = &jpeg {
                if let Err(err) = sink.write_all(jpeg).and_then(|()| sink.flush()) {
                    shutdown.cancel();
                    return Err(err).context("failed to write frame to output sink");
                }
            }

            if let Ok(mut guard) = latest.lock() {
                if jpeg.is_some() {
                    guard.jpeg = jpeg;
                }
                guard.telemetry_json = Some(json);
                guard.frame_number = item.frame_number;
            }

            report.frames += 1;
            metrics::histogram!("facecast_stage_seconds", "stage" => "broadcast")
                .record(started.elapsed().as_secs_f64());
        }

        debug!(
            frames = report.frames,
            delivered = report.telemetry_delivered,
            "broadcast stage finished"
        );
        Ok(report)
    })
    .context("failed to spawn broadcast thread")
}
