//! Reliable single-hop delivery toward the parent.
//!
//! Payloads are copied into a FIFO queue and sent serially: only the head
//! is ever in flight, acknowledged per hop and retried with quadratic
//! backoff until `MAX_TRIES` is exhausted. Receivers acknowledge every
//! frame — duplicates included — and deduplicate by `(source, seqno)`
//! before forwarding toward their own parent.
//!
//! The relay also owns the radio side of the sleep policy: when sleeping is
//! allowed and the queue drains, both ports close; any new work reopens
//! them. Exactly one relay exists per node so that policy is unambiguous.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::config::NodeConfig;
use crate::time::{Duration, Timestamp};
use crate::traits::{Radio, Random};
use crate::types::{NodeId, ACK_BYTE, PARENT_NONE};

/// A queued frame: `[seqno][payload]` plus its retry counter.
#[derive(Debug)]
struct Outbound {
    frame: Vec<u8>,
    tries: u8,
}

/// Head-of-queue send progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    /// Nothing scheduled. With a non-empty queue this is the hold state:
    /// no parent is installed yet.
    Idle,
    /// The head transmits once `at` is reached.
    Armed { at: Timestamp },
    /// The head is in flight; retry when `deadline` passes.
    AwaitingAck { deadline: Timestamp },
}

/// Result of processing a data-port frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// Sink only: hand the payload to the application.
    Deliver {
        from: NodeId,
        seqno: u8,
        payload: Vec<u8>,
    },
    /// Forwarder: re-enqueue the payload toward this node's own parent.
    Forward {
        from: NodeId,
        seqno: u8,
        payload: Vec<u8>,
    },
    /// Already seen; acknowledged again but not propagated.
    Duplicate { from: NodeId, seqno: u8 },
    /// Frame too short to carry a sequence number.
    Malformed { from: NodeId },
}

/// Result of processing an ACK-port frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The head was acknowledged and released.
    Popped,
    /// Nothing was in flight; the ACK was ignored.
    Unexpected,
}

/// Result of a timer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPoll {
    /// The head was (re)transmitted.
    Sent { dest: NodeId, seqno: u8, tries: u8 },
    /// The in-flight head timed out. `abandoned` is set when the retry
    /// budget ran out and the frame was dropped.
    TimedOut {
        parent: NodeId,
        tries: u8,
        abandoned: bool,
    },
}

/// Duplicate-suppression history: the last seqno per source.
///
/// Insertion evicts the source's previous entry first, so at most one
/// entry per source ever exists; beyond capacity the oldest sources are
/// forgotten, FIFO.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<(NodeId, u8)>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Whether `(source, seqno)` matches the last recorded frame.
    pub fn contains(&self, source: NodeId, seqno: u8) -> bool {
        self.entries
            .iter()
            .any(|&(id, seq)| id == source && seq == seqno)
    }

    /// Record `(source, seqno)`, evicting the source's older entry and
    /// trimming the oldest sources beyond capacity.
    pub fn record(&mut self, source: NodeId, seqno: u8) {
        self.entries.retain(|&(id, _)| id != source);
        self.entries.push_back((source, seqno));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The per-node reliable unicast state.
pub struct Relay<Cfg> {
    queue: VecDeque<Outbound>,
    history: History,
    seqno: u8,
    parent: NodeId,
    online: bool,
    sleep_allowed: bool,
    state: SendState,
    _config: PhantomData<Cfg>,
}

impl<Cfg: NodeConfig> Relay<Cfg> {
    /// Create an offline relay. Call `init` before use.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            history: History::new(Cfg::MAX_HISTORY),
            seqno: 0,
            parent: PARENT_NONE,
            online: false,
            sleep_allowed: false,
            state: SendState::Idle,
            _config: PhantomData,
        }
    }

    /// Open both ports. No frames move in either direction before this.
    pub fn init<L: Radio>(&mut self, radio: &mut L) {
        self.go_online(radio);
    }

    /// The parent all queued frames are addressed to.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Whether the data and ACK ports are open.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Number of frames waiting (including the in-flight head).
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Duplicate-suppression history, for inspection.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The next instant `poll` has work to do, if any.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match self.state {
            SendState::Idle => None,
            SendState::Armed { at } => Some(at),
            SendState::AwaitingAck { deadline } => Some(deadline),
        }
    }

    fn go_online<L: Radio>(&mut self, radio: &mut L) {
        if !self.online {
            radio.open(Cfg::DATA_PORT);
            radio.open(Cfg::ACK_PORT);
            self.online = true;
        }
    }

    fn go_offline<L: Radio>(&mut self, radio: &mut L) {
        if self.online {
            radio.close(Cfg::DATA_PORT);
            radio.close(Cfg::ACK_PORT);
            self.online = false;
        }
    }

    fn next_send_delay<R: Random>(&self, random: &mut R) -> Duration {
        let base = Cfg::NEXT_SEND_DELAY.as_millis();
        Duration::from_millis(random.gen_range(base / 2, base + 1))
    }

    /// Install the parent frames are relayed to (`PARENT_NONE` clears it).
    ///
    /// An in-flight frame is not cancelled; it times out against the old
    /// parent and its retries go to the new one. A held queue starts
    /// moving as soon as a real parent arrives.
    pub fn set_parent<R: Random>(&mut self, parent: NodeId, random: &mut R, now: Timestamp) {
        self.parent = parent;
        if parent != PARENT_NONE && !self.queue.is_empty() && self.state == SendState::Idle {
            self.state = SendState::Armed {
                at: now + self.next_send_delay(random),
            };
        }
    }

    /// Let the relay close its ports whenever the queue is empty.
    pub fn allow_sleep<L: Radio>(&mut self, radio: &mut L) {
        self.sleep_allowed = true;
        if self.queue.is_empty() {
            self.go_offline(radio);
        }
    }

    /// Keep the ports open; reopen them if currently closed.
    pub fn disallow_sleep<L: Radio>(&mut self, radio: &mut L) {
        self.sleep_allowed = false;
        self.go_online(radio);
    }

    /// Copy a payload into the queue behind a fresh sequence number.
    ///
    /// Wakes the radio if it was sleeping. The seqno is fixed here, at
    /// enqueue time, so retransmissions carry the same number.
    pub fn enqueue<L: Radio, R: Random>(
        &mut self,
        radio: &mut L,
        random: &mut R,
        payload: &[u8],
        now: Timestamp,
    ) {
        self.go_online(radio);

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(self.seqno);
        frame.extend_from_slice(payload);
        self.seqno = self.seqno.wrapping_add(1);

        let was_empty = self.queue.is_empty();
        self.queue.push_back(Outbound { frame, tries: 0 });

        if was_empty && self.state == SendState::Idle && self.parent != PARENT_NONE {
            self.state = SendState::Armed {
                at: now + self.next_send_delay(random),
            };
        }
    }

    /// Drive the send state machine. Call whenever `next_deadline` passes.
    pub fn poll<L: Radio, R: Random>(
        &mut self,
        radio: &mut L,
        random: &mut R,
        now: Timestamp,
    ) -> Option<RelayPoll> {
        match self.state {
            SendState::Idle => None,
            SendState::Armed { at } if now >= at => self.transmit_head(radio, now),
            SendState::AwaitingAck { deadline } if now >= deadline => {
                Some(self.on_timeout(radio, random, now))
            }
            _ => None,
        }
    }

    fn transmit_head<L: Radio>(&mut self, radio: &mut L, now: Timestamp) -> Option<RelayPoll> {
        if self.parent == PARENT_NONE {
            self.state = SendState::Idle;
            return None;
        }
        let dest = self.parent;
        let head = match self.queue.front_mut() {
            Some(head) => head,
            None => {
                self.state = SendState::Idle;
                return None;
            }
        };
        let _ = radio.unicast(Cfg::DATA_PORT, dest, &head.frame);
        head.tries += 1;
        let seqno = head.frame[0];
        let tries = head.tries;
        self.state = SendState::AwaitingAck {
            deadline: now + Cfg::ACK_TIMEOUT,
        };
        Some(RelayPoll::Sent { dest, seqno, tries })
    }

    fn on_timeout<L: Radio, R: Random>(
        &mut self,
        radio: &mut L,
        random: &mut R,
        now: Timestamp,
    ) -> RelayPoll {
        let parent = self.parent;
        let tries = self.queue.front().map(|o| o.tries).unwrap_or(0);

        let abandoned = tries > Cfg::MAX_TRIES;
        if abandoned {
            self.queue.pop_front();
            if self.queue.is_empty() && self.sleep_allowed {
                self.go_offline(radio);
            }
        }

        if self.queue.is_empty() {
            self.state = SendState::Idle;
        } else {
            // Quadratic backoff with full jitter, scaled by the current
            // head's retry count (zero for a fresh head).
            let head_tries = self.queue.front().map(|o| o.tries).unwrap_or(0) as u64;
            let ceiling = Cfg::FAIL_DELAY.as_millis() * head_tries * head_tries;
            let delay = random.gen_range(0, ceiling + 1);
            self.state = SendState::Armed {
                at: now + Duration::from_millis(delay),
            };
        }

        RelayPoll::TimedOut {
            parent,
            tries,
            abandoned,
        }
    }

    /// Process an ACK-port frame.
    ///
    /// ACKs carry no sequence number: per-hop sends are serial, so an ACK
    /// always refers to the head. With nothing in flight it is ignored.
    pub fn on_ack<L: Radio, R: Random>(
        &mut self,
        radio: &mut L,
        random: &mut R,
        now: Timestamp,
    ) -> AckOutcome {
        if self.queue.is_empty() {
            return AckOutcome::Unexpected;
        }
        self.queue.pop_front();

        if self.queue.is_empty() {
            self.state = SendState::Idle;
            if self.sleep_allowed {
                self.go_offline(radio);
            }
        } else {
            self.state = SendState::Armed {
                at: now + self.next_send_delay(random),
            };
        }
        AckOutcome::Popped
    }

    /// Process a data-port frame.
    ///
    /// The ACK goes out first and unconditionally: it confirms receipt, not
    /// novelty, so a retry caused by a lost ACK still clears the sender.
    /// The sink checks its history but never records into it; forwarders
    /// record and pass the payload on.
    pub fn on_data<L: Radio>(
        &mut self,
        radio: &mut L,
        src: NodeId,
        data: &[u8],
        is_sink: bool,
    ) -> DataOutcome {
        let Some((&seqno, payload)) = data.split_first() else {
            return DataOutcome::Malformed { from: src };
        };

        let _ = radio.unicast(Cfg::ACK_PORT, src, &[ACK_BYTE]);

        if self.history.contains(src, seqno) {
            return DataOutcome::Duplicate { from: src, seqno };
        }
        if is_sink {
            DataOutcome::Deliver {
                from: src,
                seqno,
                payload: payload.to_vec(),
            }
        } else {
            self.history.record(src, seqno);
            DataOutcome::Forward {
                from: src,
                seqno,
                payload: payload.to_vec(),
            }
        }
    }
}

impl<Cfg: NodeConfig> Default for Relay<Cfg> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use crate::traits::test_impls::{MockRadio, MockRandom};

    type TestRelay = Relay<DefaultConfig>;

    fn setup() -> (TestRelay, MockRadio, MockRandom) {
        let mut radio = MockRadio::new();
        let mut relay = TestRelay::new();
        relay.init(&mut radio);
        (relay, radio, MockRandom::with_seed(7))
    }

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_send_and_ack_cycle() {
        let (mut relay, mut radio, mut random) = setup();
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"hi", t(0));

        // Armed with the next-send jitter: fires within [5, 10] ms.
        let at = relay.next_deadline().unwrap();
        assert!(at >= t(5) && at <= t(10), "unexpected arm time {at:?}");
        assert_eq!(relay.poll(&mut radio, &mut random, t(4)), None);

        let sent = relay.poll(&mut radio, &mut random, at).unwrap();
        assert_eq!(
            sent,
            RelayPoll::Sent {
                dest: 5,
                seqno: 0,
                tries: 1
            }
        );
        let frame = radio.sent.last().unwrap();
        assert_eq!(frame.port, DefaultConfig::DATA_PORT);
        assert_eq!(frame.dest, Some(5));
        assert_eq!(frame.data, b"\x00hi");

        // Timeout armed 200ms out.
        assert_eq!(relay.next_deadline(), Some(at + DefaultConfig::ACK_TIMEOUT));

        assert_eq!(
            relay.on_ack(&mut radio, &mut random, at + Duration::from_millis(50)),
            AckOutcome::Popped
        );
        assert_eq!(relay.queue_len(), 0);
        assert_eq!(relay.next_deadline(), None);
    }

    #[test]
    fn test_holds_without_parent() {
        let (mut relay, mut radio, mut random) = setup();
        relay.enqueue(&mut radio, &mut random, b"hi", t(0));

        assert_eq!(relay.next_deadline(), None);
        assert_eq!(relay.poll(&mut radio, &mut random, t(1000)), None);
        assert!(radio.sent.is_empty());

        // Installing a parent releases the hold.
        relay.set_parent(5, &mut random, t(1000));
        let at = relay.next_deadline().unwrap();
        let sent = relay.poll(&mut radio, &mut random, at).unwrap();
        assert!(matches!(sent, RelayPoll::Sent { dest: 5, .. }));
    }

    #[test]
    fn test_fifo_order_and_seqnos() {
        let (mut relay, mut radio, mut random) = setup();
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"a", t(0));
        relay.enqueue(&mut radio, &mut random, b"b", t(0));

        let at = relay.next_deadline().unwrap();
        relay.poll(&mut radio, &mut random, at).unwrap();
        assert_eq!(radio.sent.last().unwrap().data, b"\x00a");

        relay.on_ack(&mut radio, &mut random, at);
        let at = relay.next_deadline().unwrap();
        relay.poll(&mut radio, &mut random, at).unwrap();
        assert_eq!(radio.sent.last().unwrap().data, b"\x01b");
    }

    #[test]
    fn test_seqno_wraps() {
        let (mut relay, mut radio, mut random) = setup();
        relay.seqno = 0xFF;
        relay.enqueue(&mut radio, &mut random, b"x", t(0));
        relay.enqueue(&mut radio, &mut random, b"y", t(0));
        assert_eq!(relay.queue[0].frame[0], 0xFF);
        assert_eq!(relay.queue[1].frame[0], 0x00);
    }

    #[test]
    fn test_unexpected_ack_ignored() {
        let (mut relay, mut radio, mut random) = setup();
        assert_eq!(
            relay.on_ack(&mut radio, &mut random, t(0)),
            AckOutcome::Unexpected
        );
        // Idempotent with respect to queue depth: a second ACK after the
        // pop changes nothing.
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"a", t(0));
        assert_eq!(relay.on_ack(&mut radio, &mut random, t(1)), AckOutcome::Popped);
        assert_eq!(relay.on_ack(&mut radio, &mut random, t(2)), AckOutcome::Unexpected);
        assert_eq!(relay.queue_len(), 0);
    }

    #[test]
    fn test_timeout_retries_then_abandons() {
        let (mut relay, mut radio, mut random) = setup();
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"hi", t(0));

        let mut transmissions = 0;
        loop {
            let deadline = match relay.next_deadline() {
                Some(d) => d,
                None => break,
            };
            match relay.poll(&mut radio, &mut random, deadline) {
                Some(RelayPoll::Sent { .. }) => transmissions += 1,
                Some(RelayPoll::TimedOut {
                    parent,
                    tries,
                    abandoned,
                }) => {
                    assert_eq!(parent, 5);
                    assert_eq!(tries as usize, transmissions);
                    if abandoned {
                        break;
                    }
                }
                None => unreachable!("deadline was due"),
            }
        }

        // MAX_TRIES + 1 transmissions before giving up.
        assert_eq!(transmissions, DefaultConfig::MAX_TRIES as usize + 1);
        assert_eq!(relay.queue_len(), 0);
        assert_eq!(relay.next_deadline(), None);
    }

    #[test]
    fn test_sleep_policy() {
        let (mut relay, mut radio, mut random) = setup();
        assert!(radio.is_open(DefaultConfig::DATA_PORT));
        assert!(radio.is_open(DefaultConfig::ACK_PORT));

        // Empty queue: sleep permission closes both ports immediately.
        relay.allow_sleep(&mut radio);
        assert!(!relay.is_online());
        assert!(!radio.is_open(DefaultConfig::DATA_PORT));
        assert!(!radio.is_open(DefaultConfig::ACK_PORT));

        // Enqueueing wakes the radio.
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"hi", t(0));
        assert!(relay.is_online());
        assert!(radio.is_open(DefaultConfig::DATA_PORT));

        // Queue drains by ACK while sleep is still allowed: back offline.
        let at = relay.next_deadline().unwrap();
        relay.poll(&mut radio, &mut random, at);
        relay.on_ack(&mut radio, &mut random, at);
        assert!(!relay.is_online());

        // Disallowing reopens.
        relay.disallow_sleep(&mut radio);
        assert!(relay.is_online());
    }

    #[test]
    fn test_allow_sleep_waits_for_drain() {
        let (mut relay, mut radio, mut random) = setup();
        relay.set_parent(5, &mut random, t(0));
        relay.enqueue(&mut radio, &mut random, b"hi", t(0));

        relay.allow_sleep(&mut radio);
        assert!(relay.is_online(), "non-empty queue keeps the radio on");
    }

    #[test]
    fn test_forwarder_dedup_and_ack() {
        let (mut relay, mut radio, _random) = setup();

        let out = relay.on_data(&mut radio, 9, b"\x07payload", false);
        assert_eq!(
            out,
            DataOutcome::Forward {
                from: 9,
                seqno: 7,
                payload: b"payload".to_vec()
            }
        );
        assert!(relay.history().contains(9, 7));

        // The duplicate is suppressed but still acknowledged.
        let out = relay.on_data(&mut radio, 9, b"\x07payload", false);
        assert_eq!(out, DataOutcome::Duplicate { from: 9, seqno: 7 });

        let acks: alloc::vec::Vec<_> = radio
            .sent
            .iter()
            .filter(|f| f.port == DefaultConfig::ACK_PORT)
            .collect();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].dest, Some(9));
        assert_eq!(acks[0].data, [ACK_BYTE]);
    }

    #[test]
    fn test_new_seqno_from_same_source_passes() {
        let (mut relay, mut radio, _random) = setup();
        relay.on_data(&mut radio, 9, b"\x07a", false);
        let out = relay.on_data(&mut radio, 9, b"\x08b", false);
        assert!(matches!(out, DataOutcome::Forward { seqno: 8, .. }));
        // Still one entry per source.
        assert_eq!(relay.history().len(), 1);
        assert!(!relay.history().contains(9, 7));
    }

    #[test]
    fn test_sink_redelivers_after_lost_ack() {
        // The sink never records history, so a retransmission (lost ACK)
        // is delivered again. Pinned behavior of the reference system.
        let (mut relay, mut radio, _random) = setup();
        let first = relay.on_data(&mut radio, 9, b"\x07hi", true);
        let second = relay.on_data(&mut radio, 9, b"\x07hi", true);
        assert!(matches!(first, DataOutcome::Deliver { .. }));
        assert!(matches!(second, DataOutcome::Deliver { .. }));
        assert!(relay.history().is_empty());
    }

    #[test]
    fn test_malformed_frame() {
        let (mut relay, mut radio, _random) = setup();
        let out = relay.on_data(&mut radio, 9, b"", false);
        assert_eq!(out, DataOutcome::Malformed { from: 9 });
    }

    #[test]
    fn test_history_bounds() {
        let mut history = History::new(30);
        for id in 1..=40u16 {
            history.record(id, 1);
        }
        assert_eq!(history.len(), 30);
        // Oldest sources fell off the front.
        assert!(!history.contains(1, 1));
        assert!(!history.contains(10, 1));
        assert!(history.contains(11, 1));
        assert!(history.contains(40, 1));
    }

    #[test]
    fn test_history_one_entry_per_source() {
        let mut history = History::new(30);
        history.record(9, 1);
        history.record(9, 2);
        history.record(9, 3);
        assert_eq!(history.len(), 1);
        assert!(history.contains(9, 3));
        assert!(!history.contains(9, 2));
    }
}
