//! Per-node accelerator card inventory
//!
//! Holds the truth about core allocation on every card of one node, and
//! produces independent snapshots for speculative planning.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use schedlet_core::{
    decode_unit_devices, DeviceConfig, DeviceUsage, NodeInfo, SchedletError, SchedletResult,
    UnitDevices, WorkloadUnit, ASSIGNED_IDS_ANNOTATION,
};

/// Full-capacity mask of a 3-core card.
pub const THREE_CORE_MASK: u32 = 0b111;
/// Full-capacity mask of a 4-core card.
pub const FOUR_CORE_MASK: u32 = 0b1111;

/// Units bound to a card. Shared between snapshots; planning never touches
/// it, only committed assignments do.
type SharedUnits = Arc<Mutex<HashSet<Uuid>>>;

/// One physical accelerator card and its allocation state.
#[derive(Debug, Clone)]
pub struct AccelCard {
    /// Position of the card on its node.
    pub id: usize,
    /// Cluster-unique identifier, derived from node name and position.
    pub uuid: String,
    /// Currently allocated cores. Invariant: a subset of `core_unmasked`.
    pub core_mask: u32,
    /// Full-capacity mask: 0b111 for 3-core cards, 0b1111 for 4-core.
    pub core_unmasked: u32,
    /// Number of workload units holding cores on this card.
    pub used_num: u32,
    units: SharedUnits,
}

impl AccelCard {
    pub fn new(id: usize, core_unmasked: u32, node_name: &str) -> Self {
        Self {
            id,
            uuid: format!("accel-card-{node_name}-{id}"),
            core_mask: 0,
            core_unmasked,
            used_num: 0,
            units: Arc::default(),
        }
    }

    /// Core count of the card: 3 or 4.
    pub fn width(&self) -> u32 {
        self.core_unmasked.count_ones()
    }

    /// Mask of currently free cores.
    pub fn free_mask(&self) -> u32 {
        self.core_unmasked ^ self.core_mask
    }

    /// Number of units sharing the card.
    pub fn unit_count(&self) -> usize {
        self.units.lock().map(|u| u.len()).unwrap_or(0)
    }

    fn bind_unit(&self, uid: Uuid) {
        if let Ok(mut units) = self.units.lock() {
            units.insert(uid);
        }
    }

    fn unbind_unit(&self, uid: Uuid) {
        if let Ok(mut units) = self.units.lock() {
            units.remove(&uid);
        }
    }
}

/// Dense, position-indexed card collection of one node.
#[derive(Debug, Clone)]
pub struct AccelCardSet {
    pub node_name: String,
    pub cards: Vec<AccelCard>,
}

impl AccelCardSet {
    /// Build the inventory from a node's capacity signals. Accepted only
    /// when total cores are exactly 3 or 4 per card; anything else fails
    /// with no partial set.
    pub fn build(node: &NodeInfo, config: &DeviceConfig) -> SchedletResult<Self> {
        let total_cores = node
            .capacity
            .scalar
            .get(&config.resource_core_name)
            .copied()
            .unwrap_or(0);
        let total_cards = node
            .capacity
            .scalar
            .get(&config.resource_count_name)
            .copied()
            .unwrap_or(0);
        if total_cards == 0 {
            return Err(SchedletError::InvalidTopology(format!(
                "node {} reports no accelerator cards",
                node.name
            )));
        }
        let unmasked = if total_cores == 3 * total_cards {
            THREE_CORE_MASK
        } else if total_cores == 4 * total_cards {
            FOUR_CORE_MASK
        } else {
            return Err(SchedletError::InvalidTopology(format!(
                "node {}: {total_cores} cores over {total_cards} cards is not a supported card",
                node.name
            )));
        };
        let cards: Vec<AccelCard> = (0..total_cards as usize)
            .map(|i| AccelCard::new(i, unmasked, &node.name))
            .collect();
        debug!(
            node = %node.name,
            cards = cards.len(),
            width = unmasked.count_ones(),
            "Accelerator cards registered"
        );
        Ok(Self {
            node_name: node.name.clone(),
            cards,
        })
    }

    /// Independent deep copy for speculative planning. Card state is
    /// copied; unit membership stays shared by reference.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Core count per card, 0 for an empty set.
    pub fn card_width(&self) -> u32 {
        self.cards.first().map(AccelCard::width).unwrap_or(0)
    }

    /// Commit a computed plan to this inventory.
    pub fn commit(&mut self, plan: &UnitDevices, uid: Uuid) {
        for container in plan {
            for usage in container {
                self.apply_usage(usage, uid);
            }
        }
    }

    /// Replay a unit's persisted assignment record. A unit with no record
    /// never carried a device request; that is a no-op, not an error.
    pub fn apply_assignment(&mut self, unit: &WorkloadUnit) {
        let Some(ids) = unit.annotations.get(ASSIGNED_IDS_ANNOTATION) else {
            return;
        };
        for container in decode_unit_devices(ids) {
            for usage in container {
                self.apply_usage(&usage, unit.uid);
            }
        }
    }

    /// Reverse a unit's persisted assignment record; no-op without one.
    pub fn release_assignment(&mut self, unit: &WorkloadUnit) {
        let Some(ids) = unit.annotations.get(ASSIGNED_IDS_ANNOTATION) else {
            return;
        };
        for container in decode_unit_devices(ids) {
            for usage in container {
                let delta = usage.core_mask.max(0) as u32;
                for card in &mut self.cards {
                    if card.uuid == usage.uuid {
                        card.core_mask = card.core_mask.saturating_sub(delta);
                        card.used_num = card.used_num.saturating_sub(1);
                        card.unbind_unit(unit.uid);
                    }
                }
            }
        }
    }

    fn apply_usage(&mut self, usage: &DeviceUsage, uid: Uuid) {
        let delta = usage.core_mask.max(0) as u32;
        for card in &mut self.cards {
            if card.uuid == usage.uuid {
                card.core_mask += delta;
                card.used_num += 1;
                card.bind_unit(uid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedlet_core::{encode_unit_devices, ContainerSpec, CORE_RESOURCE_NAME};

    fn three_core_set(cards: i64) -> AccelCardSet {
        let node = NodeInfo::with_accel_capacity("node-1", 3 * cards, cards);
        AccelCardSet::build(&node, &DeviceConfig::default()).unwrap()
    }

    fn assigned_unit(assignment: &UnitDevices) -> WorkloadUnit {
        let mut unit = WorkloadUnit::new("job-a-task-0", "default");
        unit.containers
            .push(ContainerSpec::with_limit(CORE_RESOURCE_NAME, 2));
        unit.annotations.insert(
            ASSIGNED_IDS_ANNOTATION.to_string(),
            encode_unit_devices(assignment),
        );
        unit
    }

    #[test]
    fn test_build_three_core() {
        let set = three_core_set(4);
        assert_eq!(set.cards.len(), 4);
        assert_eq!(set.card_width(), 3);
        assert_eq!(set.cards[2].uuid, "accel-card-node-1-2");
        assert_eq!(set.cards[2].core_unmasked, THREE_CORE_MASK);
    }

    #[test]
    fn test_build_four_core() {
        let node = NodeInfo::with_accel_capacity("node-2", 8, 2);
        let set = AccelCardSet::build(&node, &DeviceConfig::default()).unwrap();
        assert_eq!(set.card_width(), 4);
        assert_eq!(set.cards[0].core_unmasked, FOUR_CORE_MASK);
    }

    #[test]
    fn test_build_rejects_unsupported_ratio() {
        let node = NodeInfo::with_accel_capacity("node-3", 10, 4);
        let err = AccelCardSet::build(&node, &DeviceConfig::default()).unwrap_err();
        assert!(matches!(err, SchedletError::InvalidTopology(_)));
    }

    #[test]
    fn test_build_rejects_zero_cards() {
        let node = NodeInfo::with_accel_capacity("node-4", 0, 0);
        let err = AccelCardSet::build(&node, &DeviceConfig::default()).unwrap_err();
        assert!(matches!(err, SchedletError::InvalidTopology(_)));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let set = three_core_set(2);
        let mut snap = set.snapshot();
        snap.cards[1].core_mask = 0b011;
        snap.cards[1].used_num = 1;

        assert_eq!(set.cards[1].core_mask, 0);
        assert_eq!(set.cards[1].used_num, 0);
    }

    #[test]
    fn test_apply_and_release_assignment() {
        let mut set = three_core_set(2);
        let assignment = vec![vec![DeviceUsage {
            uuid: set.cards[1].uuid.clone(),
            core_mask: 0b011,
        }]];
        let unit = assigned_unit(&assignment);

        set.apply_assignment(&unit);
        assert_eq!(set.cards[1].core_mask, 0b011);
        assert_eq!(set.cards[1].used_num, 1);
        assert_eq!(set.cards[1].unit_count(), 1);
        assert_eq!(set.cards[0].core_mask, 0);

        set.release_assignment(&unit);
        assert_eq!(set.cards[1].core_mask, 0);
        assert_eq!(set.cards[1].used_num, 0);
        assert_eq!(set.cards[1].unit_count(), 0);
    }

    #[test]
    fn test_apply_without_record_is_noop() {
        let mut set = three_core_set(2);
        let unit = WorkloadUnit::new("no-devices", "default");

        set.apply_assignment(&unit);
        set.release_assignment(&unit);
        assert!(set.cards.iter().all(|c| c.core_mask == 0 && c.used_num == 0));
    }

    #[test]
    fn test_snapshot_shares_unit_membership() {
        let mut set = three_core_set(1);
        let snap = set.snapshot();
        let assignment = vec![vec![DeviceUsage {
            uuid: set.cards[0].uuid.clone(),
            core_mask: 0b001,
        }]];

        set.apply_assignment(&assigned_unit(&assignment));
        // Membership is shared by reference, card state is not.
        assert_eq!(snap.cards[0].unit_count(), 1);
        assert_eq!(snap.cards[0].core_mask, 0);
    }
}
