//! Device plugin state machine
//!
//! Drives one node's card inventory through the scheduling session: trial
//! fit-checks during the predicate phase, persisted assignment plus live
//! commit during the allocate phase, replay/reversal on unit add/remove.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use schedlet_core::{
    encode_unit_devices, DeviceConfig, Devices, FilterStatus, MetadataStore, NodeInfo, NodeLock,
    SchedletResult, WorkloadUnit, ASSIGNED_IDS_ANNOTATION, ASSIGNED_NODE_ANNOTATION,
    ASSIGNED_TIME_ANNOTATION, BIND_PHASE_ALLOCATING, BIND_PHASE_ANNOTATION, BIND_TIME_ANNOTATION,
    DEVICE_LOCK_NAME, IDS_TO_ALLOCATE_ANNOTATION,
};

use crate::device::AccelCardSet;
use crate::planner::{container_requests, plan_allocation};

/// Accelerator-sharing device plugin for one node.
pub struct AccelSharing {
    cards: AccelCardSet,
    config: Arc<DeviceConfig>,
    /// Feature toggle; when off every callback short-circuits to success.
    pub enabled: bool,
    /// Take the cluster node lock around the allocate-phase persist.
    pub node_lock_enabled: bool,
}

impl AccelSharing {
    pub fn new(cards: AccelCardSet, config: Arc<DeviceConfig>) -> Self {
        Self {
            cards,
            config,
            enabled: true,
            node_lock_enabled: false,
        }
    }

    /// Build the inventory from a node's capacity signals and wrap it.
    pub fn for_node(node: &NodeInfo, config: Arc<DeviceConfig>) -> SchedletResult<Self> {
        let cards = AccelCardSet::build(node, &config)?;
        Ok(Self::new(cards, config))
    }

    /// Live inventory view.
    pub fn cards(&self) -> &AccelCardSet {
        &self.cards
    }
}

impl Devices for AccelSharing {
    fn has_device_request(&self, unit: &WorkloadUnit) -> bool {
        self.enabled && unit.requests_resource(&self.config.resource_core_name)
    }

    fn filter_node(&self, unit: &WorkloadUnit) -> (FilterStatus, String) {
        if !self.enabled {
            return (FilterStatus::Success, String::new());
        }
        debug!(unit = %unit.name, node = %self.cards.node_name, "Device sharing filter");
        let requests = container_requests(unit, &self.config.resource_core_name);
        match plan_allocation(&requests, &self.cards) {
            Ok(_) => (FilterStatus::Success, String::new()),
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "Device sharing filter rejected unit");
                (FilterStatus::Unschedulable, format!("AccelSharing {e}"))
            }
        }
    }

    fn allocate(
        &mut self,
        metadata: &dyn MetadataStore,
        lock: &dyn NodeLock,
        unit: &WorkloadUnit,
    ) -> SchedletResult<()> {
        if !self.enabled {
            return Ok(());
        }
        debug!(unit = %unit.name, node = %self.cards.node_name, "Allocating devices");
        let requests = container_requests(unit, &self.config.resource_core_name);
        let plan = plan_allocation(&requests, &self.cards)?;
        let encoded = encode_unit_devices(&plan);
        let now = Utc::now().timestamp().to_string();

        let mut annotations = HashMap::new();
        annotations.insert(
            ASSIGNED_NODE_ANNOTATION.to_string(),
            self.cards.node_name.clone(),
        );
        annotations.insert(ASSIGNED_TIME_ANNOTATION.to_string(), now.clone());
        annotations.insert(ASSIGNED_IDS_ANNOTATION.to_string(), encoded.clone());
        annotations.insert(IDS_TO_ALLOCATE_ANNOTATION.to_string(), encoded);
        annotations.insert(
            BIND_PHASE_ANNOTATION.to_string(),
            BIND_PHASE_ALLOCATING.to_string(),
        );
        annotations.insert(BIND_TIME_ANNOTATION.to_string(), now);

        if self.node_lock_enabled {
            lock.lock_node(&self.cards.node_name, DEVICE_LOCK_NAME)?;
        }
        metadata.patch_annotations(&unit.namespace, &unit.name, &annotations)?;
        // Live masks move only after the record is durably persisted.
        self.cards.commit(&plan, unit.uid);
        info!(
            unit = %unit.name,
            node = %self.cards.node_name,
            containers = plan.len(),
            "Devices allocated"
        );
        Ok(())
    }

    fn add_resource(&mut self, unit: &WorkloadUnit) {
        self.cards.apply_assignment(unit);
    }

    fn sub_resource(&mut self, unit: &WorkloadUnit) {
        self.cards.release_assignment(unit);
    }

    fn release(&self, _unit: &WorkloadUnit) -> SchedletResult<()> {
        // Inventory is already reversed by sub_resource at removal time.
        Ok(())
    }
}
