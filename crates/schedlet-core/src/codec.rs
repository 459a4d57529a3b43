//! Compact string codec for persisted device assignments
//!
//! An assignment record is one string stored as workload-unit metadata:
//! `identifier,coreMaskDelta` entries joined by `:` within a container,
//! containers joined by `;`.

/// A single card's share of an assignment: the card identifier plus the
/// core-mask delta the workload unit holds on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUsage {
    pub uuid: String,
    pub core_mask: i32,
}

/// Device usage of one container, one entry per card touched.
pub type ContainerDevices = Vec<DeviceUsage>;

/// Device usage of a whole workload unit, in container order.
pub type UnitDevices = Vec<ContainerDevices>;

pub fn encode_container_devices(devices: &[DeviceUsage]) -> String {
    devices
        .iter()
        .map(|d| format!("{},{}", d.uuid, d.core_mask))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn encode_unit_devices(devices: &[ContainerDevices]) -> String {
    devices
        .iter()
        .map(|cd| encode_container_devices(cd))
        .collect::<Vec<_>>()
        .join(";")
}

/// Decode one container's entries. Segments without a `,` are skipped;
/// malformed mask numbers decode to zero rather than failing the unit.
pub fn decode_container_devices(s: &str) -> ContainerDevices {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(':')
        .filter_map(|entry| {
            let (uuid, mask) = entry.split_once(',')?;
            Some(DeviceUsage {
                uuid: uuid.to_string(),
                core_mask: mask.parse().unwrap_or(0),
            })
        })
        .collect()
}

/// Decode a full assignment record. Empty input is an empty assignment,
/// not an error.
pub fn decode_unit_devices(s: &str) -> UnitDevices {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(';').map(decode_container_devices).collect()
}
