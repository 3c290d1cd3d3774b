//! Public records and the parent election policies.
//!
//! A policy pairs a wire record with an election rule. Every variant runs
//! the same scan shape — classify each neighbor as potential child, actual
//! child, or parent candidate, then pick the best candidate — but they
//! disagree on what "best" means:
//!
//! - [`MaxLeaf`]: fewest hops, then most children, then lowest id.
//! - [`EnergyAware`]: as `MaxLeaf`, but within a hop count the candidate
//!   with more remaining energy wins.
//! - [`EnergyLayers`]: three overlaid trees (high/mid/low energy parents);
//!   a candidate is taken from the best layer it may parent in.
//! - [`EnergyWeighted`]: hop count weighted by the parent's energy class.
//!
//! All elections share the tie-break coin: when several candidates are
//! equally good, a node defers with probability 1/2 and publishes the
//! undefined state for one period, desynchronizing competing neighbors.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::gossip::Neighbor;
use crate::traits::Random;
use crate::types::{
    EnergyClass, NodeId, CHILDREN_ROOT, DISTANCE_UNDEFINED, PARENT_NONE, PARENT_ROOT,
};
use crate::wire::{DecodeError, Reader, Writer};

/// A record published through the gossip fabric.
pub trait Record: Clone + Debug + PartialEq {
    /// Fixed wire size in bytes.
    const WIRE_LEN: usize;

    /// Encode to wire bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decode from wire bytes. The whole buffer must be consumed.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;

    /// The published parent id (`PARENT_NONE` when undefined,
    /// `PARENT_ROOT` at the sink).
    fn parent_id(&self) -> NodeId;

    /// The published children count.
    fn children_count(&self) -> u8;

    /// The published hop distance toward the sink. Layered records report
    /// their least-constrained layer, weighted records their weighted
    /// distance.
    fn distance(&self) -> u8;

    /// Whether this record describes a node without a tree position.
    fn is_undefined(&self) -> bool {
        self.parent_id() == PARENT_NONE
    }

    /// The controller's change predicate: only parent or children changes
    /// are significant, distance drift alone is not.
    fn tree_shape_changed(old: &Self, new: &Self) -> bool {
        old.parent_id() != new.parent_id() || old.children_count() != new.children_count()
    }
}

/// Base record: hop distance to the sink, elected parent, children count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRecord {
    pub distance: u8,
    pub parent: NodeId,
    pub children: u8,
}

impl Record for TreeRecord {
    const WIRE_LEN: usize = 4;

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::WIRE_LEN);
        w.write_u8(self.distance);
        w.write_u16_be(self.parent);
        w.write_u8(self.children);
        w.into_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let record = Self {
            distance: r.read_u8()?,
            parent: r.read_u16_be()?,
            children: r.read_u8()?,
        };
        r.finish()?;
        Ok(record)
    }

    fn parent_id(&self) -> NodeId {
        self.parent
    }

    fn children_count(&self) -> u8 {
        self.children
    }

    fn distance(&self) -> u8 {
        self.distance
    }
}

/// Record with an energy class, shared by the energy-preferring and the
/// energy-weighted variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyRecord {
    pub distance: u8,
    pub parent: NodeId,
    pub children: u8,
    pub energy: EnergyClass,
}

impl Record for EnergyRecord {
    const WIRE_LEN: usize = 5;

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::WIRE_LEN);
        w.write_u8(self.distance);
        w.write_u16_be(self.parent);
        w.write_u8(self.children);
        w.write_u8(self.energy as u8);
        w.into_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let record = Self {
            distance: r.read_u8()?,
            parent: r.read_u16_be()?,
            children: r.read_u8()?,
            energy: EnergyClass::from_wire(r.read_u8()?),
        };
        r.finish()?;
        Ok(record)
    }

    fn parent_id(&self) -> NodeId {
        self.parent
    }

    fn children_count(&self) -> u8 {
        self.children
    }

    fn distance(&self) -> u8 {
        self.distance
    }
}

/// Layered record: one distance per energy layer.
///
/// `d_high` is the hop count in the subgraph whose interior nodes all have
/// high energy, `d_mid` allows mid-or-better parents, `d_low` allows any.
/// One record thereby advertises membership in up to three candidate trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayeredRecord {
    pub d_high: u8,
    pub d_mid: u8,
    pub d_low: u8,
    pub parent: NodeId,
    pub children: u8,
    pub energy: EnergyClass,
}

impl Record for LayeredRecord {
    // Byte 3 is padding, kept for layout compatibility with deployed nodes.
    const WIRE_LEN: usize = 8;

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::WIRE_LEN);
        w.write_u8(self.d_high);
        w.write_u8(self.d_mid);
        w.write_u8(self.d_low);
        w.write_u8(0);
        w.write_u16_be(self.parent);
        w.write_u8(self.children);
        w.write_u8(self.energy as u8);
        w.into_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let d_high = r.read_u8()?;
        let d_mid = r.read_u8()?;
        let d_low = r.read_u8()?;
        let _pad = r.read_u8()?;
        let record = Self {
            d_high,
            d_mid,
            d_low,
            parent: r.read_u16_be()?,
            children: r.read_u8()?,
            energy: EnergyClass::from_wire(r.read_u8()?),
        };
        r.finish()?;
        Ok(record)
    }

    fn parent_id(&self) -> NodeId {
        self.parent
    }

    fn children_count(&self) -> u8 {
        self.children
    }

    fn distance(&self) -> u8 {
        self.d_low
    }
}

/// Outcome of one election pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot<V> {
    /// Elected parent, `PARENT_NONE` when the node stays undefined.
    pub parent: NodeId,
    /// The record to publish for the coming period.
    pub record: V,
    /// True when a parent existed but the tie-break coin deferred adoption.
    pub deferred: bool,
    /// True when some neighbor advertised the undefined state; observers
    /// stay awake for it.
    pub saw_undefined_neighbor: bool,
}

/// An election variant over its record type.
pub trait Policy {
    type Record: Record;

    /// The record the sink publishes unconditionally.
    fn sink_record(energy: EnergyClass) -> Self::Record;

    /// The undefined record with the given potential-children count.
    fn undefined_record(children: u8, energy: EnergyClass) -> Self::Record;

    /// Run one election pass over the neighborhood.
    fn elect<'a, R, I>(
        own_id: NodeId,
        energy: EnergyClass,
        neighbors: I,
        random: &mut R,
    ) -> Ballot<Self::Record>
    where
        R: Random,
        I: Iterator<Item = &'a Neighbor<Self::Record>>,
        Self::Record: 'a;
}

/// Running best-candidate state shared by the single-distance variants.
struct Candidate {
    id: NodeId,
    distance: u16,
    energy: EnergyClass,
    children: u8,
}

/// The base maximum-leaf election.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxLeaf;

impl Policy for MaxLeaf {
    type Record = TreeRecord;

    fn sink_record(_energy: EnergyClass) -> TreeRecord {
        TreeRecord {
            distance: 0,
            parent: PARENT_ROOT,
            children: CHILDREN_ROOT,
        }
    }

    fn undefined_record(children: u8, _energy: EnergyClass) -> TreeRecord {
        TreeRecord {
            distance: DISTANCE_UNDEFINED,
            parent: PARENT_NONE,
            children,
        }
    }

    fn elect<'a, R, I>(
        own_id: NodeId,
        energy: EnergyClass,
        neighbors: I,
        random: &mut R,
    ) -> Ballot<TreeRecord>
    where
        R: Random,
        I: Iterator<Item = &'a Neighbor<TreeRecord>>,
    {
        let mut children: u8 = 0;
        let mut saw_undefined = false;
        let mut best: Option<Candidate> = None;
        let mut potential: u8 = 0;

        for n in neighbors {
            let r = &n.record;
            if r.is_undefined() {
                saw_undefined = true;
                children = children.saturating_add(1);
                continue;
            }
            if r.parent == own_id {
                children = children.saturating_add(1);
                continue;
            }
            // u16 arithmetic so an undefined-distance record can never win.
            let d = r.distance as u16 + 1;
            if d >= DISTANCE_UNDEFINED as u16 {
                continue;
            }
            match &mut best {
                None => {
                    best = Some(Candidate {
                        id: n.id,
                        distance: d,
                        energy,
                        children: r.children,
                    });
                    potential = 1;
                }
                Some(b) => {
                    if d < b.distance {
                        b.id = n.id;
                        b.distance = d;
                        b.children = r.children;
                        potential = 1;
                    } else if d == b.distance {
                        if r.children > b.children {
                            b.id = n.id;
                            b.children = r.children;
                            potential = 1;
                        } else if r.children == b.children {
                            potential = potential.saturating_add(1);
                            if n.id < b.id {
                                b.id = n.id;
                            }
                        }
                    }
                }
            }
        }

        finish_single_distance::<MaxLeaf, _>(best, potential, children, energy, saw_undefined, random)
    }
}

/// EA1: prefer high-energy parents within a hop count.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyAware;

impl Policy for EnergyAware {
    type Record = EnergyRecord;

    fn sink_record(energy: EnergyClass) -> EnergyRecord {
        EnergyRecord {
            distance: 0,
            parent: PARENT_ROOT,
            children: CHILDREN_ROOT,
            energy,
        }
    }

    fn undefined_record(children: u8, energy: EnergyClass) -> EnergyRecord {
        EnergyRecord {
            distance: DISTANCE_UNDEFINED,
            parent: PARENT_NONE,
            children,
            energy,
        }
    }

    fn elect<'a, R, I>(
        own_id: NodeId,
        energy: EnergyClass,
        neighbors: I,
        random: &mut R,
    ) -> Ballot<EnergyRecord>
    where
        R: Random,
        I: Iterator<Item = &'a Neighbor<EnergyRecord>>,
    {
        let mut children: u8 = 0;
        let mut saw_undefined = false;
        let mut best: Option<Candidate> = None;
        let mut potential: u8 = 0;

        for n in neighbors {
            let r = &n.record;
            if r.is_undefined() {
                saw_undefined = true;
                children = children.saturating_add(1);
                continue;
            }
            if r.parent == own_id || r.energy == EnergyClass::Undefined {
                children = children.saturating_add(1);
                continue;
            }
            let d = r.distance as u16 + 1;
            if d >= DISTANCE_UNDEFINED as u16 {
                continue;
            }
            match &mut best {
                None => {
                    best = Some(Candidate {
                        id: n.id,
                        distance: d,
                        energy: r.energy,
                        children: r.children,
                    });
                    potential = 1;
                }
                Some(b) => {
                    let better = d < b.distance
                        || (d == b.distance && r.energy < b.energy)
                        || (d == b.distance && r.energy == b.energy && r.children > b.children);
                    if better {
                        b.id = n.id;
                        b.distance = d;
                        b.energy = r.energy;
                        b.children = r.children;
                        potential = 1;
                    } else if d == b.distance && r.energy == b.energy && r.children == b.children {
                        potential = potential.saturating_add(1);
                        if n.id < b.id {
                            b.id = n.id;
                        }
                    }
                }
            }
        }

        finish_single_distance::<EnergyAware, _>(
            best,
            potential,
            children,
            energy,
            saw_undefined,
            random,
        )
    }
}

/// EA3: hop distance weighted by the parent's energy class.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyWeighted;

impl Policy for EnergyWeighted {
    type Record = EnergyRecord;

    fn sink_record(energy: EnergyClass) -> EnergyRecord {
        EnergyAware::sink_record(energy)
    }

    fn undefined_record(children: u8, energy: EnergyClass) -> EnergyRecord {
        EnergyAware::undefined_record(children, energy)
    }

    fn elect<'a, R, I>(
        own_id: NodeId,
        energy: EnergyClass,
        neighbors: I,
        random: &mut R,
    ) -> Ballot<EnergyRecord>
    where
        R: Random,
        I: Iterator<Item = &'a Neighbor<EnergyRecord>>,
    {
        let mut children: u8 = 0;
        let mut saw_undefined = false;
        let mut best: Option<Candidate> = None;
        let mut potential: u8 = 0;

        for n in neighbors {
            let r = &n.record;
            if r.is_undefined() {
                saw_undefined = true;
                children = children.saturating_add(1);
                continue;
            }
            if r.parent == own_id || r.energy == EnergyClass::Undefined {
                children = children.saturating_add(1);
                continue;
            }
            // The edge to a parent costs its energy class (1 = high energy,
            // cheap; 3 = low energy, expensive).
            let d = r.distance as u16 + r.energy.weight();
            if d >= DISTANCE_UNDEFINED as u16 {
                continue;
            }
            match &mut best {
                None => {
                    best = Some(Candidate {
                        id: n.id,
                        distance: d,
                        energy: r.energy,
                        children: r.children,
                    });
                    potential = 1;
                }
                Some(b) => {
                    if d < b.distance {
                        b.id = n.id;
                        b.distance = d;
                        b.energy = r.energy;
                        b.children = r.children;
                        potential = 1;
                    } else if d == b.distance {
                        if r.children > b.children {
                            b.id = n.id;
                            b.energy = r.energy;
                            b.children = r.children;
                            potential = 1;
                        } else if r.children == b.children {
                            potential = potential.saturating_add(1);
                            if n.id < b.id {
                                b.id = n.id;
                            }
                        }
                    }
                }
            }
        }

        finish_single_distance::<EnergyWeighted, _>(
            best,
            potential,
            children,
            energy,
            saw_undefined,
            random,
        )
    }
}

/// Shared adoption/deferral step for the variants publishing one distance.
fn finish_single_distance<P, R>(
    best: Option<Candidate>,
    potential: u8,
    children: u8,
    energy: EnergyClass,
    saw_undefined: bool,
    random: &mut R,
) -> Ballot<P::Record>
where
    P: Policy,
    P::Record: SingleDistance,
    R: Random,
{
    match best {
        Some(b) => {
            if potential > 1 && random.coin() {
                Ballot {
                    parent: PARENT_NONE,
                    record: P::undefined_record(children, energy),
                    deferred: true,
                    saw_undefined_neighbor: saw_undefined,
                }
            } else {
                Ballot {
                    parent: b.id,
                    record: P::Record::adopted(b.distance as u8, b.id, children, energy),
                    deferred: false,
                    saw_undefined_neighbor: saw_undefined,
                }
            }
        }
        None => Ballot {
            parent: PARENT_NONE,
            record: P::undefined_record(children, energy),
            deferred: false,
            saw_undefined_neighbor: saw_undefined,
        },
    }
}

/// Records that publish exactly one distance field.
trait SingleDistance: Record {
    fn adopted(distance: u8, parent: NodeId, children: u8, energy: EnergyClass) -> Self;
}

impl SingleDistance for TreeRecord {
    fn adopted(distance: u8, parent: NodeId, children: u8, _energy: EnergyClass) -> Self {
        TreeRecord {
            distance,
            parent,
            children,
        }
    }
}

impl SingleDistance for EnergyRecord {
    fn adopted(distance: u8, parent: NodeId, children: u8, energy: EnergyClass) -> Self {
        EnergyRecord {
            distance,
            parent,
            children,
            energy,
        }
    }
}

/// EA2: overlaid trees per energy layer, preferring the highest layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyLayers;

/// Layer ranks, best first.
const LAYER_HIGH: u8 = 0;
const LAYER_MID: u8 = 1;
const LAYER_LOW: u8 = 2;

impl EnergyLayers {
    /// The best layer a neighbor may parent this node in, with the hop
    /// count through it. High requires a high-energy neighbor, mid at
    /// least mid energy, low accepts any defined energy.
    fn classify(r: &LayeredRecord) -> Option<(u8, u16)> {
        let undef = DISTANCE_UNDEFINED as u16;
        if r.energy == EnergyClass::High && r.d_high != DISTANCE_UNDEFINED {
            let d = r.d_high as u16 + 1;
            if d < undef {
                return Some((LAYER_HIGH, d));
            }
        }
        if r.energy <= EnergyClass::Mid && r.d_mid != DISTANCE_UNDEFINED {
            let d = r.d_mid as u16 + 1;
            if d < undef {
                return Some((LAYER_MID, d));
            }
        }
        if r.d_low != DISTANCE_UNDEFINED {
            let d = r.d_low as u16 + 1;
            if d < undef {
                return Some((LAYER_LOW, d));
            }
        }
        None
    }
}

struct LayerCandidate {
    id: NodeId,
    layer: u8,
    distance: u16,
    children: u8,
}

impl Policy for EnergyLayers {
    type Record = LayeredRecord;

    fn sink_record(energy: EnergyClass) -> LayeredRecord {
        LayeredRecord {
            d_high: 0,
            d_mid: 0,
            d_low: 0,
            parent: PARENT_ROOT,
            children: CHILDREN_ROOT,
            energy,
        }
    }

    fn undefined_record(children: u8, energy: EnergyClass) -> LayeredRecord {
        LayeredRecord {
            d_high: DISTANCE_UNDEFINED,
            d_mid: DISTANCE_UNDEFINED,
            d_low: DISTANCE_UNDEFINED,
            parent: PARENT_NONE,
            children,
            energy,
        }
    }

    fn elect<'a, R, I>(
        own_id: NodeId,
        energy: EnergyClass,
        neighbors: I,
        random: &mut R,
    ) -> Ballot<LayeredRecord>
    where
        R: Random,
        I: Iterator<Item = &'a Neighbor<LayeredRecord>>,
    {
        let mut children: u8 = 0;
        let mut saw_undefined = false;
        // Advertised per-layer distances, recomputed from scratch each pass.
        let mut d_high: u8 = DISTANCE_UNDEFINED;
        let mut d_mid: u8 = DISTANCE_UNDEFINED;
        let mut d_low: u8 = DISTANCE_UNDEFINED;
        let mut best: Option<LayerCandidate> = None;
        let mut potential: u8 = 0;

        for n in neighbors {
            let r = &n.record;
            if r.is_undefined() {
                saw_undefined = true;
                children = children.saturating_add(1);
                continue;
            }
            if r.parent == own_id || r.energy == EnergyClass::Undefined {
                children = children.saturating_add(1);
                continue;
            }

            // Layer distances we would advertise through this neighbor.
            if r.energy == EnergyClass::High && r.d_high != DISTANCE_UNDEFINED {
                let via = r.d_high as u16 + 1;
                if via < d_high as u16 {
                    d_high = via as u8;
                }
            }
            if r.energy <= EnergyClass::Mid && r.d_mid != DISTANCE_UNDEFINED {
                let via = r.d_mid as u16 + 1;
                if via < d_mid as u16 {
                    d_mid = via as u8;
                }
            }
            if r.d_low != DISTANCE_UNDEFINED {
                let via = r.d_low as u16 + 1;
                if via < d_low as u16 {
                    d_low = via as u8;
                }
            }

            let Some((layer, d)) = Self::classify(r) else {
                continue;
            };
            match &mut best {
                None => {
                    best = Some(LayerCandidate {
                        id: n.id,
                        layer,
                        distance: d,
                        children: r.children,
                    });
                    potential = 1;
                }
                Some(b) => {
                    if (layer, d) < (b.layer, b.distance) {
                        b.id = n.id;
                        b.layer = layer;
                        b.distance = d;
                        b.children = r.children;
                        potential = 1;
                    } else if (layer, d) == (b.layer, b.distance) {
                        if r.children > b.children {
                            b.id = n.id;
                            b.children = r.children;
                            potential = 1;
                        } else if r.children == b.children {
                            potential = potential.saturating_add(1);
                            if n.id < b.id {
                                b.id = n.id;
                            }
                        }
                    }
                }
            }
        }

        match best {
            Some(b) => {
                if potential > 1 && random.coin() {
                    Ballot {
                        parent: PARENT_NONE,
                        record: Self::undefined_record(children, energy),
                        deferred: true,
                        saw_undefined_neighbor: saw_undefined,
                    }
                } else {
                    Ballot {
                        parent: b.id,
                        record: LayeredRecord {
                            d_high,
                            d_mid,
                            d_low,
                            parent: b.id,
                            children,
                            energy,
                        },
                        deferred: false,
                        saw_undefined_neighbor: saw_undefined,
                    }
                }
            }
            None => Ballot {
                parent: PARENT_NONE,
                record: Self::undefined_record(children, energy),
                deferred: false,
                saw_undefined_neighbor: saw_undefined,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use crate::traits::test_impls::FixedRandom;

    fn nbr<V>(id: NodeId, record: V) -> Neighbor<V> {
        Neighbor {
            id,
            record,
            heard_at: Timestamp::ZERO,
        }
    }

    /// Random that never defers.
    fn decisive() -> FixedRandom {
        FixedRandom { offset: 1 }
    }

    /// Random that always defers on a tie.
    fn hesitant() -> FixedRandom {
        FixedRandom { offset: 0 }
    }

    #[test]
    fn test_tree_record_wire_layout() {
        let r = TreeRecord {
            distance: 2,
            parent: 0x1234,
            children: 7,
        };
        assert_eq!(r.encode(), [2, 0x12, 0x34, 7]);
        assert_eq!(TreeRecord::decode(&[2, 0x12, 0x34, 7]), Ok(r));
        assert!(TreeRecord::decode(&[2, 0x12]).is_err());
        assert!(TreeRecord::decode(&[2, 0x12, 0x34, 7, 0]).is_err());
    }

    #[test]
    fn test_layered_record_wire_layout() {
        let r = LayeredRecord {
            d_high: 1,
            d_mid: 2,
            d_low: 3,
            parent: 0x00FF,
            children: 4,
            energy: EnergyClass::Mid,
        };
        let bytes = r.encode();
        assert_eq!(bytes.len(), LayeredRecord::WIRE_LEN);
        assert_eq!(bytes, [1, 2, 3, 0, 0x00, 0xFF, 4, 2]);
        assert_eq!(LayeredRecord::decode(&bytes), Ok(r));
    }

    #[test]
    fn test_elect_prefers_lower_distance() {
        let nbrs = [
            nbr(10, TreeRecord { distance: 3, parent: 99, children: 5 }),
            nbr(11, TreeRecord { distance: 1, parent: 99, children: 0 }),
        ];
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
        assert_eq!(ballot.record.distance, 2);
        assert_eq!(ballot.record.children, 0);
        assert!(!ballot.deferred);
    }

    #[test]
    fn test_elect_tie_breaks_on_children_then_id() {
        let nbrs = [
            nbr(10, TreeRecord { distance: 1, parent: 99, children: 2 }),
            nbr(11, TreeRecord { distance: 1, parent: 99, children: 4 }),
            nbr(12, TreeRecord { distance: 1, parent: 99, children: 4 }),
        ];
        // Equal (distance, children) between 11 and 12: lowest id wins.
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
    }

    #[test]
    fn test_elect_defers_on_ambiguous_tie() {
        let nbrs = [
            nbr(10, TreeRecord { distance: 1, parent: 99, children: 0 }),
            nbr(11, TreeRecord { distance: 1, parent: 99, children: 0 }),
        ];
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut hesitant());
        assert!(ballot.deferred);
        assert_eq!(ballot.parent, PARENT_NONE);
        assert_eq!(ballot.record.distance, DISTANCE_UNDEFINED);
        // The potential-children count survives the deferral.
        assert_eq!(ballot.record.children, 0);

        // A unique best parent is adopted even by a hesitant node.
        let nbrs = [nbr(10, TreeRecord { distance: 1, parent: 99, children: 0 })];
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut hesitant());
        assert!(!ballot.deferred);
        assert_eq!(ballot.parent, 10);
    }

    #[test]
    fn test_undefined_neighbors_become_children() {
        let nbrs = [
            nbr(10, TreeRecord { distance: DISTANCE_UNDEFINED, parent: PARENT_NONE, children: 0 }),
            nbr(11, TreeRecord { distance: 1, parent: 99, children: 0 }),
            nbr(12, TreeRecord { distance: 2, parent: 1, children: 0 }), // claims us
        ];
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
        assert_eq!(ballot.record.children, 2);
        assert!(ballot.saw_undefined_neighbor);
    }

    #[test]
    fn test_no_candidate_stays_undefined() {
        let nbrs = [
            nbr(12, TreeRecord { distance: 2, parent: 1, children: 0 }),
        ];
        let ballot = MaxLeaf::elect(1, EnergyClass::Undefined, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, PARENT_NONE);
        assert!(!ballot.deferred);
        assert_eq!(ballot.record.children, 1);
    }

    #[test]
    fn test_sink_record_sentinels() {
        let r = MaxLeaf::sink_record(EnergyClass::Undefined);
        assert_eq!(r.distance, 0);
        assert_eq!(r.parent, PARENT_ROOT);
        assert_eq!(r.children, CHILDREN_ROOT);
    }

    #[test]
    fn test_energy_aware_prefers_energy_within_distance() {
        let nbrs = [
            nbr(10, EnergyRecord { distance: 1, parent: 99, children: 9, energy: EnergyClass::Low }),
            nbr(11, EnergyRecord { distance: 1, parent: 99, children: 0, energy: EnergyClass::High }),
        ];
        // Energy outranks children count at the same distance.
        let ballot = EnergyAware::elect(1, EnergyClass::Mid, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
        assert_eq!(ballot.record.energy, EnergyClass::Mid); // publishes own energy

        // Distance still outranks energy.
        let nbrs = [
            nbr(10, EnergyRecord { distance: 1, parent: 99, children: 0, energy: EnergyClass::Low }),
            nbr(11, EnergyRecord { distance: 2, parent: 99, children: 0, energy: EnergyClass::High }),
        ];
        let ballot = EnergyAware::elect(1, EnergyClass::Mid, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 10);
    }

    #[test]
    fn test_energy_aware_undefined_energy_is_child() {
        let nbrs = [
            nbr(10, EnergyRecord { distance: 1, parent: 99, children: 0, energy: EnergyClass::Undefined }),
        ];
        let ballot = EnergyAware::elect(1, EnergyClass::Mid, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, PARENT_NONE);
        assert_eq!(ballot.record.children, 1);
    }

    #[test]
    fn test_energy_weighted_distance() {
        // Low-energy neighbor at the sink costs 0 + 3; high-energy neighbor
        // one weighted hop out costs 1 + 1. The high-energy route wins even
        // though it has more physical hops.
        let nbrs = [
            nbr(10, EnergyRecord { distance: 0, parent: PARENT_ROOT, children: 0, energy: EnergyClass::Low }),
            nbr(11, EnergyRecord { distance: 1, parent: 99, children: 0, energy: EnergyClass::High }),
        ];
        let ballot = EnergyWeighted::elect(1, EnergyClass::Mid, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
        assert_eq!(ballot.record.distance, 2);
    }

    #[test]
    fn test_layers_prefers_higher_layer() {
        // Candidate 10 offers a short low-layer route, candidate 11 a
        // longer high-layer route. The layer outranks the distance.
        let nbrs = [
            nbr(10, LayeredRecord {
                d_high: DISTANCE_UNDEFINED, d_mid: DISTANCE_UNDEFINED, d_low: 0,
                parent: PARENT_ROOT, children: 0, energy: EnergyClass::Low,
            }),
            nbr(11, LayeredRecord {
                d_high: 3, d_mid: 3, d_low: 3,
                parent: 99, children: 0, energy: EnergyClass::High,
            }),
        ];
        let ballot = EnergyLayers::elect(1, EnergyClass::Low, nbrs.iter(), &mut decisive());
        assert_eq!(ballot.parent, 11);
        assert_eq!(ballot.record.d_high, 4);
    }

    #[test]
    fn test_layers_eligibility_gated_by_energy() {
        // A mid-energy neighbor advertising a valid d_high may not parent
        // in the high layer; it classifies as mid.
        let r = LayeredRecord {
            d_high: 1,
            d_mid: 1,
            d_low: 1,
            parent: 99,
            children: 0,
            energy: EnergyClass::Mid,
        };
        assert_eq!(EnergyLayers::classify(&r), Some((LAYER_MID, 2)));

        let low = LayeredRecord { energy: EnergyClass::Low, ..r };
        assert_eq!(EnergyLayers::classify(&low), Some((LAYER_LOW, 2)));

        let high = LayeredRecord { energy: EnergyClass::High, ..r };
        assert_eq!(EnergyLayers::classify(&high), Some((LAYER_HIGH, 2)));
    }

    #[test]
    fn test_layers_single_candidate_adopted() {
        // One eligible neighbor: adopted without any comparison against a
        // pre-existing best.
        let nbrs = [nbr(10, LayeredRecord {
            d_high: 0, d_mid: 0, d_low: 0,
            parent: PARENT_ROOT, children: CHILDREN_ROOT, energy: EnergyClass::High,
        })];
        let ballot = EnergyLayers::elect(1, EnergyClass::Low, nbrs.iter(), &mut hesitant());
        assert_eq!(ballot.parent, 10);
        assert_eq!(ballot.record.d_high, 1);
        assert_eq!(ballot.record.d_mid, 1);
        assert_eq!(ballot.record.d_low, 1);
    }

    #[test]
    fn test_layers_advertised_distances_span_layers() {
        // A high-energy neighbor feeds all three layers; a low-energy one
        // feeds only the low layer.
        let nbrs = [
            nbr(10, LayeredRecord {
                d_high: 2, d_mid: 2, d_low: 2,
                parent: 99, children: 0, energy: EnergyClass::High,
            }),
            nbr(11, LayeredRecord {
                d_high: DISTANCE_UNDEFINED, d_mid: DISTANCE_UNDEFINED, d_low: 0,
                parent: PARENT_ROOT, children: 0, energy: EnergyClass::Low,
            }),
        ];
        let ballot = EnergyLayers::elect(1, EnergyClass::Mid, nbrs.iter(), &mut decisive());
        // Parent comes from the high layer, but the advertised low distance
        // is the short route through 11.
        assert_eq!(ballot.parent, 10);
        assert_eq!(ballot.record.d_high, 3);
        assert_eq!(ballot.record.d_mid, 3);
        assert_eq!(ballot.record.d_low, 1);
    }
}
