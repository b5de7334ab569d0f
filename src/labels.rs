//! Bit tables for the four status bitmasks of the status frame.

macro_rules! read_bit {
    ($byte:expr,$position:expr) => {
        ($byte >> $position) & 1 != 0
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLabel {
    pub bit: u8,
    pub label: &'static str,
}

/// Labels for bits 0 to 7 of one mask, in ascending bit order.
pub type BitLabelTable = [BitLabel; 8];

#[rustfmt::skip]
pub static CHARGING_STATES: BitLabelTable = [
    BitLabel { bit: 0, label: "Overcurrent protection (SOCC)" },
    BitLabel { bit: 1, label: "Over temperature (OTC)" },
    BitLabel { bit: 2, label: "Undertemperature (UTC)" },
    BitLabel { bit: 3, label: "Cell overvoltage (COV)" },
    BitLabel { bit: 4, label: "Battery overvoltage (FC)" },
    BitLabel { bit: 5, label: "Reserved" },
    BitLabel { bit: 6, label: "Reserved" },
    BitLabel { bit: 7, label: "Charging MOS (CHG)" },
];

#[rustfmt::skip]
pub static CHARGING_WARNINGS: BitLabelTable = [
    BitLabel { bit: 0, label: "Overcurrent (OCC1)" },
    BitLabel { bit: 1, label: "Over temperature (OTC)" },
    BitLabel { bit: 2, label: "Undertemperature (UTC1)" },
    BitLabel { bit: 3, label: "Differential Pressure (DP)" },
    BitLabel { bit: 4, label: "Fully charged (FC)" },
    BitLabel { bit: 5, label: "Reserved" },
    BitLabel { bit: 6, label: "Reserved" },
    BitLabel { bit: 7, label: "Reserved" },
];

#[rustfmt::skip]
pub static DISCHARGING_STATES: BitLabelTable = [
    BitLabel { bit: 0, label: "Overcurrent protection (SOCD)" },
    BitLabel { bit: 1, label: "Over temperature (OTD)" },
    BitLabel { bit: 2, label: "Undertemperature (UTD)" },
    BitLabel { bit: 3, label: "Battery undervoltage (CUV)" },
    BitLabel { bit: 4, label: "Battery empty (FD)" },
    BitLabel { bit: 5, label: "Short circuit protection (ASCD)" },
    BitLabel { bit: 6, label: "Termination of discharge (TDA)" },
    BitLabel { bit: 7, label: "Discharging MOS (DSG)" },
];

#[rustfmt::skip]
pub static DISCHARGING_WARNINGS: BitLabelTable = [
    BitLabel { bit: 0, label: "Overcurrent (OCD1)" },
    BitLabel { bit: 1, label: "Over temperature (OTD1)" },
    BitLabel { bit: 2, label: "Undertemperature (UTD1)" },
    BitLabel { bit: 3, label: "Differential Pressure (DP)" },
    BitLabel { bit: 4, label: "Not enough time left (RTA)" },
    BitLabel { bit: 5, label: "Insufficient capacity remaining (RCA)" },
    BitLabel { bit: 6, label: "Battery undervoltage (CUV)" },
    BitLabel { bit: 7, label: "Battery empty (FD)" },
];

/// Returns the label of every set bit, lowest bit first.
///
/// `Reserved` entries are returned as well; callers may filter them.
pub fn labels(mask: u8, table: &BitLabelTable) -> Vec<&'static str> {
    table
        .iter()
        .filter(|entry| read_bit!(mask, entry.bit))
        .map(|entry| entry.label)
        .collect()
}
