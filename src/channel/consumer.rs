use std::collections::VecDeque;

use tracing::trace;

use crate::channel::{ConsumerBackend, ConsumerMessage, SeqNo};

/// A slot in the consumer's reorder buffer. An absent payload means the
/// producer has reported the event as permanently lost
/// (`retransmit_failed`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OptionalEvent<P> {
    pub seq: SeqNo,
    pub payload: Option<P>,
}

/// Handles events from a single producer, delivering them to the backend in
/// strictly increasing sequence order with no gaps and no duplicates.
///
/// A consumer starts out unsynchronized (`next_seq == 0`) and only starts
/// delivering after the producer's handshake told it where its part of the
/// stream begins. Progress is tracked per tick: while the consumer is idle
/// but knows (from events or heartbeats) that the stream has moved past it,
/// it requests the missing sequence numbers with a NACK.
pub struct Consumer<P, B> {
    backend: B,

    /// the next sequence number to deliver; 0 until the handshake arrived
    next_seq: SeqNo,

    /// the currently known end of the event stream (one past the newest seq
    /// we have evidence of)
    last_seq: SeqNo,

    /// out-of-order events, strictly ascending by seq, no duplicates, all
    /// with `seq > next_seq`
    buf: VecDeque<OptionalEvent<P>>,

    /// number of elapsed ticks
    num_ticks: u64,

    /// the value of `next_seq` at the previous tick
    last_tick_seq: SeqNo,

    /// ticks without progress
    idle_ticks: u32,

    /// ack cadence in ticks, as dictated by the producer's handshake;
    /// 0 until synchronized
    heartbeat_interval: u16,

    /// ticks without progress before sending a NACK
    nack_timeout: u32,
}

impl<P, B: ConsumerBackend<P>> Consumer<P, B> {
    pub fn new(backend: B) -> Consumer<P, B> {
        Consumer {
            backend,
            next_seq: 0,
            last_seq: 0,
            buf: VecDeque::new(),
            num_ticks: 0,
            last_tick_seq: 0,
            idle_ticks: 0,
            heartbeat_interval: 0,
            nack_timeout: 5,
        }
    }

    /// Synchronize on the producer's handshake. A late handshake (for an
    /// offset we have already moved past) is ignored.
    pub fn handle_handshake(&mut self, offset: SeqNo, heartbeat_interval: u16) {
        if offset >= self.next_seq {
            self.next_seq = offset + 1;
            self.last_seq = self.next_seq;
            self.heartbeat_interval = heartbeat_interval;
            self.try_consume_buffer();
        }
    }

    /// Move the known end of the stream forward. Heartbeats before the
    /// handshake, or from a producer that has not produced anything yet, are
    /// meaningless and ignored.
    pub fn handle_heartbeat(&mut self, seq: SeqNo) {
        if self.last_seq == 0 || seq == 0 {
            return;
        }
        if seq + 1 > self.last_seq {
            self.last_seq = seq + 1;
        }
    }

    pub fn handle_event(&mut self, seq: SeqNo, payload: P) {
        if seq == self.next_seq {
            self.backend.consume(payload);
            self.bump_seq();
            self.try_consume_buffer();
        } else if seq > self.next_seq {
            if seq > self.last_seq {
                self.last_seq = seq;
            }
            self.insert_slot(seq, Some(payload));
        } else {
            trace!("event {} already delivered - dropping duplicate", seq);
        }
    }

    pub fn handle_retransmit_failed(&mut self, seq: SeqNo) {
        if seq == self.next_seq {
            if let Err(err) = self.backend.consume_gap() {
                self.backend.close(err);
                return;
            }
            self.bump_seq();
            self.try_consume_buffer();
        } else if seq > self.next_seq {
            self.insert_slot(seq, None);
        }
    }

    /// Advance logical time: send the periodic cumulative ack, and NACK
    /// missing events once the consumer has been stuck long enough.
    pub fn tick(&mut self) {
        let progressed = self.next_seq > self.last_tick_seq;
        self.last_tick_seq = self.next_seq;
        self.num_ticks += 1;
        if progressed {
            self.idle_ticks = 0;
            if self.heartbeat_interval > 0 && self.num_ticks % self.heartbeat_interval as u64 == 0
            {
                self.send_ack();
            }
            return;
        }
        self.idle_ticks += 1;
        if self.next_seq < self.last_seq && self.idle_ticks >= self.nack_timeout {
            self.idle_ticks = 0;
            // every seq in [next_seq, last_seq) that is not in the buffer is
            // missing and gets requested
            let mut seqs = Vec::with_capacity((self.last_seq - self.next_seq) as usize);
            let mut i = self.next_seq;
            for slot in &self.buf {
                while i < slot.seq {
                    seqs.push(i);
                    i += 1;
                }
                i += 1;
            }
            while i < self.last_seq {
                seqs.push(i);
                i += 1;
            }
            self.backend.send(ConsumerMessage::Nack { seqs });
            return;
        }
        if self.heartbeat_interval > 0 && self.num_ticks % self.heartbeat_interval as u64 == 0 {
            self.send_ack();
        }
    }

    pub fn buf(&self) -> &VecDeque<OptionalEvent<P>> {
        &self.buf
    }

    pub fn next_seq(&self) -> SeqNo {
        self.next_seq
    }

    pub fn last_seq(&self) -> SeqNo {
        self.last_seq
    }

    pub fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub fn heartbeat_interval(&self) -> u16 {
        self.heartbeat_interval
    }

    pub fn nack_timeout(&self) -> u32 {
        self.nack_timeout
    }

    pub fn set_nack_timeout(&mut self, value: u32) {
        self.nack_timeout = value;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Insert into the reorder buffer, keeping it sorted by seq and free of
    /// duplicates. A full slot is never downgraded: a duplicate payload for
    /// an already-full slot is dropped, and a `retransmit_failed` for a slot
    /// that meanwhile received its payload keeps the payload.
    fn insert_slot(&mut self, seq: SeqNo, payload: Option<P>) {
        match self.buf.iter().position(|slot| slot.seq >= seq) {
            None => self.buf.push_back(OptionalEvent { seq, payload }),
            Some(i) => {
                if self.buf[i].seq != seq {
                    self.buf.insert(i, OptionalEvent { seq, payload });
                } else if self.buf[i].payload.is_none() {
                    if payload.is_some() {
                        self.buf[i].payload = payload;
                    }
                }
            }
        }
    }

    // bump the sequence number for the next expected event
    fn bump_seq(&mut self) {
        self.next_seq += 1;
        if self.next_seq > self.last_seq {
            self.last_seq = self.next_seq;
        }
    }

    /// Deliver buffered events until hitting the end or a gap that is
    /// neither available nor known missing. On a fatal gap the consumed
    /// prefix is dropped and the consumer closes.
    fn try_consume_buffer(&mut self) {
        while let Some(head) = self.buf.front_mut() {
            if head.seq != self.next_seq {
                break;
            }
            match head.payload.take() {
                Some(payload) => {
                    self.buf.pop_front();
                    self.backend.consume(payload);
                }
                None => {
                    if let Err(err) = self.backend.consume_gap() {
                        self.backend.close(err);
                        return;
                    }
                    self.buf.pop_front();
                }
            }
            self.bump_seq();
        }
    }

    fn send_ack(&mut self) {
        let seq = if self.next_seq > 0 { self.next_seq - 1 } else { 0 };
        self.backend.send(ConsumerMessage::CumulativeAck { seq });
    }
}
