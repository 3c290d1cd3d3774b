//! The controller period: election, publication, and the sleep policy.
//!
//! One period is one `tick`: reconcile the tree position against the
//! neighborhood, hand the parent to the relay, publish the record,
//! age the neighbor table, and decide whether the coming period is spent
//! awake or asleep. The period length is jittered and shortened while the
//! local state is in flux.

use alloc::vec::Vec;

use crate::config::NodeConfig;
use crate::debug::DebugEvent;
use crate::gossip::Neighbor;
use crate::node::{Node, Role};
use crate::policy::{Policy, Record};
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Radio, Random};
use crate::types::{Event, PARENT_NONE};

impl<L, R, C, P, Cfg> Node<L, R, C, P, Cfg>
where
    L: Radio,
    R: Random,
    C: Clock,
    P: Policy,
    Cfg: NodeConfig,
{
    /// Run one controller period.
    pub(crate) fn tick(&mut self, now: Timestamp) {
        self.emit(DebugEvent::PeriodTick { timestamp: now });

        self.reconcile();

        // Hand the elected parent to the relay. The sink consumes payloads
        // and never relays, so its relay stays parentless.
        let relay_parent = match self.role {
            Role::Sink => PARENT_NONE,
            Role::Sensor => self.record.parent_id(),
        };
        self.relay.set_parent(relay_parent, &mut self.random, now);

        // Publish. A sleeping leaf stays silent; it broadcasts again on
        // its next awake period, well inside the neighbor age limit.
        if self.gossip.is_online() {
            let record = self.record.clone();
            self.gossip.broadcast(&mut self.radio, &record);
        }

        if self.stay_active > 0 {
            self.stay_active -= 1;
        }
        if self.period_divisor > 1 {
            self.period_divisor -= 1;
        }

        self.prune(now);
        self.apply_mode(now);

        self.next_period = now + self.period_length();
    }

    /// Recompute the published record. Sensors run the election; the sink
    /// republishes the root sentinels unconditionally.
    fn reconcile(&mut self) {
        match self.role {
            Role::Sink => {
                self.record = P::sink_record(self.energy);
            }
            Role::Sensor => {
                let neighbors: Vec<Neighbor<P::Record>> = self.gossip.iter().cloned().collect();
                let ballot = P::elect(self.id, self.energy, neighbors.iter(), &mut self.random);

                if ballot.saw_undefined_neighbor {
                    self.stay_active = Cfg::STAY_ACTIVE_PERIODS;
                }

                if ballot.deferred {
                    self.emit(DebugEvent::ElectionDeferred);
                } else if ballot.parent != PARENT_NONE {
                    if self.record != ballot.record {
                        self.stay_active = Cfg::STAY_ACTIVE_PERIODS;
                        self.period_divisor = Cfg::CHANGE_PERIOD_DIVISOR;
                    }
                    self.emit(DebugEvent::Elected {
                        parent: ballot.parent,
                        distance: ballot.record.distance(),
                        children: ballot.record.children_count(),
                    });
                } else {
                    self.emit(DebugEvent::NoCandidate {
                        children: ballot.record.children_count(),
                    });
                }

                if self.record.parent_id() != ballot.record.parent_id() {
                    let _ = self.events.try_send(Event::ParentChanged {
                        parent: ballot.record.parent_id(),
                    });
                }
                self.record = ballot.record;
            }
        }
    }

    /// Evict outdated neighbor entries. Losing the parent resets the node
    /// to the undefined state; the relay keeps the stale parent until the
    /// next tick, letting any in-flight frame time out naturally.
    fn prune(&mut self, now: Timestamp) {
        for neighbor in self.gossip.remove_stale(now) {
            self.stay_active = Cfg::STAY_ACTIVE_PERIODS;
            self.emit(DebugEvent::NeighborExpired { id: neighbor.id });

            if self.role == Role::Sensor && neighbor.id == self.record.parent_id() {
                self.emit(DebugEvent::ParentLost { id: neighbor.id });
                self.record = P::undefined_record(0, self.energy);
                let _ = self.events.try_send(Event::ParentChanged {
                    parent: PARENT_NONE,
                });
            }
        }
    }

    /// Decide how the coming period is spent: on-radio (undefined and
    /// backbone nodes, recently perturbed leaves, leaves with a stale view
    /// of their parent) or asleep (settled leaves).
    fn apply_mode(&mut self, now: Timestamp) {
        let was_online = self.gossip.is_online();

        match self.role {
            Role::Sink => {
                self.gossip.set_online(&mut self.radio);
                self.relay.disallow_sleep(&mut self.radio);
            }
            Role::Sensor => {
                if self.is_undefined() {
                    self.gossip.set_online(&mut self.radio);
                    self.relay.disallow_sleep(&mut self.radio);
                } else if self.is_leaf() {
                    self.relay.allow_sleep(&mut self.radio);
                    if self.stay_active > 0 || self.parent_entry_stale(now) {
                        // Awake period to fetch news before sleeping again.
                        self.gossip.set_online(&mut self.radio);
                    } else {
                        self.gossip.set_offline(&mut self.radio);
                    }
                } else {
                    // Backbone: the subtree routes through us.
                    self.gossip.set_online(&mut self.radio);
                    self.relay.disallow_sleep(&mut self.radio);
                }
            }
        }

        let online = self.gossip.is_online();
        if online != was_online {
            self.emit(DebugEvent::SleepChanged { online });
        }
    }

    fn parent_entry_stale(&self, now: Timestamp) -> bool {
        match self.gossip.get(self.record.parent_id()) {
            Some(entry) => now.saturating_sub(entry.heard_at) > Cfg::MAX_PARENT_AGE,
            None => true,
        }
    }

    /// Next period length: base, jittered by uniform [0.8, 1.0], divided
    /// while converging.
    pub(crate) fn period_length(&mut self) -> Duration {
        let base = Cfg::PERIOD.as_millis();
        let jittered = self.random.gen_range(base * 8 / 10, base + 1);
        let divisor = self.period_divisor.max(1) as u64;
        Duration::from_millis((jittered / divisor).max(1))
    }
}
