//! Bitmask bin-packing across a node's accelerator cards
//!
//! Requests at or below one card's capacity pack into a single card
//! (shared mode); larger requests consume whole cards (exclusive mode).
//! Planning always runs against a trial snapshot: callers persist the
//! resulting record first and commit it to live inventory afterwards.

use tracing::debug;

use schedlet_core::{
    ContainerDevices, DeviceUsage, SchedletError, SchedletResult, UnitDevices, WorkloadUnit,
};

use crate::device::{AccelCard, AccelCardSet};

/// One container's accelerator demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreRequest {
    pub cores: i64,
}

/// Per-container core demands, in container order. Containers without a
/// limit under `core_resource` contribute nothing.
pub fn container_requests(unit: &WorkloadUnit, core_resource: &str) -> Vec<CoreRequest> {
    unit.containers
        .iter()
        .filter_map(|c| c.limits.get(core_resource))
        .map(|&cores| CoreRequest { cores })
        .collect()
}

/// A request is legal when it fits inside one card (shared) or spans whole
/// cards (exclusive).
fn request_legal(width: u32, cores: i64) -> bool {
    let width = width as i64;
    match width {
        3 | 4 => cores < width || cores % width == 0,
        _ => false,
    }
}

/// Pick `want` free cores on the card, lowest bit positions first. Returns
/// the card's new allocated mask; fails without taking anything when the
/// card has fewer free bits than `want`.
pub fn try_fill_bits(card: &AccelCard, want: u32) -> SchedletResult<u32> {
    let mut pool = card.free_mask();
    if pool.count_ones() < want {
        return Err(SchedletError::InsufficientCapacity(format!(
            "card {} has {} free cores, need {want}",
            card.uuid,
            pool.count_ones()
        )));
    }
    let mut needs = want;
    let mut new_bits = 0u32;
    let mut pos = 1u32;
    while needs > 0 && pool > 0 {
        if pool & 1 == 1 {
            needs -= 1;
            new_bits |= pos;
        }
        pool >>= 1;
        pos <<= 1;
    }
    Ok(card.core_mask | new_bits)
}

/// Trial-allocate the unit's demands against `set` without touching it.
///
/// Returns one device-usage list per requesting container, each entry a
/// `(card uuid, mask delta)` pair. Commit with [`AccelCardSet::commit`]
/// once the record is persisted.
pub fn plan_allocation(
    requests: &[CoreRequest],
    set: &AccelCardSet,
) -> SchedletResult<UnitDevices> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    let mut trial = set.snapshot();
    let width = trial.card_width();
    if width == 0 {
        return Err(SchedletError::InsufficientCapacity(format!(
            "no accelerator cards on node {}",
            trial.node_name
        )));
    }
    for request in requests {
        if !request_legal(width, request.cores) {
            return Err(SchedletError::RequestNotLegal(format!(
                "{} cores does not match {width}-core cards",
                request.cores
            )));
        }
    }
    let mut plan = Vec::with_capacity(requests.len());
    for request in requests {
        plan.push(plan_container(*request, &mut trial, width)?);
    }
    Ok(plan)
}

fn plan_container(
    request: CoreRequest,
    trial: &mut AccelCardSet,
    width: u32,
) -> SchedletResult<ContainerDevices> {
    let mut remaining = request.cores;
    let exclusive = remaining > width as i64;
    if remaining > trial.cards.len() as i64 * width as i64 {
        return Err(SchedletError::InsufficientCapacity(format!(
            "node {} has {} cards of {width} cores, requested {}",
            trial.node_name,
            trial.cards.len(),
            request.cores
        )));
    }
    debug!(cores = request.cores, exclusive, "Planning container demand");

    let mut devices = Vec::new();
    for i in (0..trial.cards.len()).rev() {
        let card = &trial.cards[i];
        let new_mask = if exclusive {
            // Exclusive consumption only starts from untouched cards.
            if card.core_mask != 0 {
                continue;
            }
            card.core_unmasked
        } else {
            // Shared requests must fit on a single card whole; a card with
            // too few free bits is skipped, nothing partial is taken.
            match try_fill_bits(card, remaining as u32) {
                Ok(mask) => mask,
                Err(_) => continue,
            }
        };
        debug!(card = %card.uuid, exclusive, "Card fits");
        if exclusive {
            remaining -= width as i64;
        } else {
            remaining = 0;
        }
        let card = &mut trial.cards[i];
        devices.push(DeviceUsage {
            uuid: card.uuid.clone(),
            core_mask: (new_mask - card.core_mask) as i32,
        });
        card.core_mask = new_mask;
        card.used_num += 1;
        if remaining == 0 {
            break;
        }
    }
    if remaining > 0 {
        return Err(SchedletError::InsufficientCapacity(format!(
            "not enough free accelerator cores on node {}",
            trial.node_name
        )));
    }
    Ok(devices)
}
