use std::cmp::min;
use std::collections::VecDeque;
use std::fmt::Debug;

use tracing::{debug, trace};

use crate::channel::{ProducerBackend, ProducerMessage, SeqNo};
use crate::error::BusError;
use crate::util::lamport::{LamportClock, LamportTimestamp};

/// A buffered event, retained until every consumer has acknowledged it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferedEvent<P> {
    pub seq: SeqNo,
    pub payload: P,
}

/// Bookkeeping for one downstream consumer.
#[derive(Debug)]
pub struct ProducerPath<H> {
    /// allows the backend to uniquely address this consumer
    pub hdl: H,

    /// the producer's sequence number at the time this consumer was added
    pub offset: SeqNo,

    /// the sequence number of the last cumulative ack
    pub acked: SeqNo,

    /// the first time a cumulative ack for `acked` arrived
    pub first_acked: LamportTimestamp,

    /// the last time a cumulative ack for `acked` arrived (keepalive acks
    /// repeat the same value)
    pub last_acked: LamportTimestamp,
}

/// Produces ordered events for any number of consumers.
///
/// Events are kept in a send buffer until the slowest consumer has
/// acknowledged them; an optional high-water cap bounds that retention, at
/// the price of answering later retransmission requests for evicted events
/// with `retransmit_failed`.
pub struct Producer<H, P, B> {
    backend: B,

    /// monotonically increasing counter (starting at 1) establishing the
    /// order of events on this channel
    seq: SeqNo,

    clock: LamportClock,

    /// the last time anything was broadcast (event or heartbeat)
    last_broadcast: LamportTimestamp,

    /// outgoing events in strictly increasing seq order
    buf: VecDeque<BufferedEvent<P>>,

    paths: Vec<ProducerPath<H>>,

    /// maximum time between broadcasts, in ticks; when nothing else goes
    /// out, a heartbeat is inserted after this interval. 0 disables
    /// heartbeats.
    heartbeat_interval: u16,

    /// optional cap on the send buffer; exceeding it evicts the oldest event
    high_water: Option<usize>,
}

impl<H: Clone + Eq + Debug, P: Clone, B: ProducerBackend<H, P>> Producer<H, P, B> {
    pub fn new(backend: B) -> Producer<H, P, B> {
        Producer {
            backend,
            seq: 0,
            clock: LamportClock::new(),
            last_broadcast: LamportTimestamp::default(),
            buf: VecDeque::new(),
            paths: Vec::new(),
            heartbeat_interval: 5,
            high_water: None,
        }
    }

    /// Assign the next sequence number to `payload` and broadcast it. With no
    /// consumers attached the payload is discarded outright - there is nobody
    /// to retain it for.
    pub fn produce(&mut self, payload: P) {
        if self.paths.is_empty() {
            trace!("produce without consumers - discarding");
            return;
        }
        self.seq += 1;
        self.buf.push_back(BufferedEvent {
            seq: self.seq,
            payload: payload.clone(),
        });
        if let Some(cap) = self.high_water {
            if self.buf.len() > cap {
                let evicted = self.buf.pop_front();
                debug!(
                    "send buffer exceeds high water mark of {} - evicting event {:?}",
                    cap,
                    evicted.map(|e| e.seq)
                );
            }
        }
        self.last_broadcast = self.clock.now();
        self.backend.broadcast(ProducerMessage::Event {
            seq: self.seq,
            payload,
        });
    }

    /// Attach a consumer and send it the handshake telling it where the
    /// event stream starts for it.
    pub fn add(&mut self, hdl: H) -> Result<(), BusError> {
        if self.find_path(&hdl).is_some() {
            return Err(BusError::ConsumerExists);
        }
        let now = self.clock.now();
        self.paths.push(ProducerPath {
            hdl: hdl.clone(),
            offset: self.seq,
            acked: self.seq,
            first_acked: now,
            last_acked: now,
        });
        self.backend.send(
            &hdl,
            ProducerMessage::Handshake {
                first_seq: self.seq,
                heartbeat_interval: self.heartbeat_interval,
            },
        );
        Ok(())
    }

    /// Process a cumulative ack from `hdl`, dropping events from the buffer
    /// once all consumers have acknowledged them.
    ///
    /// Iterates all paths once, updating the path belonging to `hdl` and
    /// fetching the minimum acknowledged sequence number in one go. A
    /// keepalive ack (repeating the previous value) only refreshes
    /// `last_acked` and skips the buffer scan.
    pub fn handle_ack(&mut self, hdl: &H, seq: SeqNo) {
        let now = self.clock.now();
        let mut acked = seq;
        let mut found = false;
        for path in &mut self.paths {
            if path.hdl == *hdl {
                if path.acked > seq {
                    trace!("ack from the past from {:?} - ignoring", hdl);
                    return;
                }
                if path.acked == seq {
                    path.last_acked = now;
                    return;
                }
                path.acked = seq;
                path.first_acked = now;
                path.last_acked = now;
                found = true;
            } else {
                acked = min(path.acked, acked);
            }
        }
        if !found {
            debug!("ack from unknown consumer {:?} - ignoring", hdl);
            return;
        }
        while self.buf.front().map(|e| e.seq <= acked).unwrap_or(false) {
            self.buf.pop_front();
        }
    }

    /// Process a retransmission request. `seqs` must be sorted; everything
    /// before the first missing number counts as implicitly acknowledged.
    /// `[0]` asks for a fresh handshake instead.
    pub fn handle_nack(&mut self, hdl: &H, seqs: &[SeqNo]) {
        let Some(&first) = seqs.first() else {
            return;
        };
        let Some(path) = self.find_path(hdl) else {
            debug!("nack from unknown consumer {:?} - ignoring", hdl);
            return;
        };
        if first == 0 {
            let first_seq = path.offset;
            self.backend.send(
                hdl,
                ProducerMessage::Handshake {
                    first_seq,
                    heartbeat_interval: self.heartbeat_interval,
                },
            );
            return;
        }
        self.handle_ack(hdl, first - 1);
        for &seq in seqs {
            match self.find_event(seq).cloned() {
                Some(event) => self.backend.send(
                    hdl,
                    ProducerMessage::Event {
                        seq: event.seq,
                        payload: event.payload,
                    },
                ),
                None => self
                    .backend
                    .send(hdl, ProducerMessage::RetransmitFailed { seq }),
            }
        }
    }

    /// Advance logical time. When the heartbeat interval has elapsed since
    /// the last broadcast, announce the current head to all consumers.
    pub fn tick(&mut self) {
        let now = self.clock.tick();
        if self.heartbeat_interval > 0 && self.last_broadcast + self.heartbeat_interval as u64 == now
        {
            self.last_broadcast = now;
            self.backend
                .broadcast(ProducerMessage::Heartbeat { seq: self.seq });
        }
    }

    /// true iff every consumer has acknowledged everything produced so far
    pub fn idle(&self) -> bool {
        self.paths.iter().all(|p| p.acked == self.seq)
    }

    pub fn seq(&self) -> SeqNo {
        self.seq
    }

    pub fn buf(&self) -> &VecDeque<BufferedEvent<P>> {
        &self.buf
    }

    pub fn paths(&self) -> &[ProducerPath<H>] {
        &self.paths
    }

    pub fn heartbeat_interval(&self) -> u16 {
        self.heartbeat_interval
    }

    pub fn set_heartbeat_interval(&mut self, value: u16) {
        self.heartbeat_interval = value;
    }

    pub fn set_send_buffer_high_water(&mut self, value: Option<usize>) {
        self.high_water = value;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn find_path(&self, hdl: &H) -> Option<&ProducerPath<H>> {
        self.paths.iter().find(|p| p.hdl == *hdl)
    }

    fn find_event(&self, seq: SeqNo) -> Option<&BufferedEvent<P>> {
        self.buf.iter().find(|e| e.seq == seq)
    }
}
