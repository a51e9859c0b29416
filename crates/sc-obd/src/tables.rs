//! Fixed lookup tables for the special-cased PIDs (SAE J1979).

/// PID 011C.
pub const OBD_STANDARDS: &[(u8, &str)] = &[
    (0x00, "Unknown"),
    (0x01, "OBD-II as defined by the CARB"),
    (0x02, "OBD as defined by the EPA"),
    (0x03, "OBD and OBD-II"),
    (0x04, "OBD-I"),
    (0x05, "Not meant to comply with any OBD standard"),
    (0x06, "EOBD (Europe)"),
    (0x07, "EOBD and OBD-II"),
    (0x08, "EOBD and OBD"),
    (0x09, "EOBD, OBD and OBD II"),
    (0x0A, "JOBD (Japan)"),
    (0x0B, "JOBD and OBD II"),
    (0x0C, "JOBD and EOBD"),
    (0x0D, "JOBD, EOBD, and OBD II"),
];

/// PID 0151.
pub const FUEL_TYPES: &[(u8, &str)] = &[
    (0x00, "Unknown"),
    (0x01, "Gasoline"),
    (0x02, "Methanol"),
    (0x03, "Ethanol"),
    (0x04, "Diesel"),
    (0x05, "LPG"),
    (0x06, "CNG"),
    (0x07, "Propane"),
    (0x08, "Electric"),
    (0x09, "Bifuel running Gasoline"),
    (0x0A, "Bifuel running Methanol"),
    (0x0B, "Bifuel running Ethanol"),
    (0x0C, "Bifuel running LPG"),
    (0x0D, "Bifuel running CNG"),
    (0x0E, "Bifuel running Propane"),
    (0x0F, "Bifuel running Electricity"),
    (0x10, "Bifuel mixed gas/electric"),
    (0x11, "Hybrid gasoline"),
    (0x12, "Hybrid Ethanol"),
    (0x13, "Hybrid Diesel"),
    (0x14, "Hybrid Electric"),
    (0x15, "Hybrid Mixed fuel"),
    (0x16, "Hybrid Regenerative"),
];

/// PID 0103, indexed by bit number.
pub const FUEL_SYSTEM_STATUSES: [&str; 5] = [
    "Open loop due to insufficient engine temperature",
    "Closed loop, using oxygen sensor feedback to determine fuel mix",
    "Open loop due to engine load OR fuel cut due to deceleration",
    "Open loop due to system failure",
    "Closed loop, using at least one oxygen sensor but there is a fault in the feedback system",
];

/// PID 0112, indexed by bit number.
pub const SECONDARY_AIR_STATUSES: [&str; 3] = [
    "Upstream of catalytic converter",
    "Downstream of catalytic converter",
    "From the outside atmosphere or off",
];

/// Indexed by bit 3 of the second monitor byte.
pub const IGNITION_TYPES: [&str; 2] = ["Spark", "Compression"];

/// Indexed by bit number within the second monitor byte.
pub const CONTINUOUS_MONITORS: [&str; 3] = ["Misfire", "Fuel system", "Components"];

pub const SPARK_MONITORS: [&str; 8] = [
    "Catalyst",
    "Heated Catalyst",
    "Evaporative System",
    "Secondary Air System",
    "A/C Refrigerant",
    "Oxygen Sensor",
    "Oxygen Sensor Heater",
    "EGR System",
];

/// Bits 2 and 4 are reserved for compression ignition.
pub const COMPRESSION_MONITORS: [&str; 8] = [
    "NMHC Cat",
    "NOx/SCR Monitor",
    "",
    "Boost Pressure",
    "",
    "Exhaust Gas Sensor",
    "PM filter monitoring",
    "EGR and/or VVT System",
];

pub const COMPRESSION_MONITOR_BITS: [usize; 6] = [0, 1, 3, 5, 6, 7];

/// Mode 09 PID 08, one big-endian word per counter.
pub const SPARK_PERFORMANCE_COUNTERS: &[&str] = &[
    "OBD monitoring conditions encountered",
    "Ignition cycles",
    "Catalyst monitor completions bank 1",
    "Catalyst monitor conditions encountered bank 1",
    "Catalyst monitor completions bank 2",
    "Catalyst monitor conditions encountered bank 2",
    "O2 sensor monitor completions bank 1",
    "O2 sensor monitor conditions encountered bank 1",
    "O2 sensor monitor completions bank 2",
    "O2 sensor monitor conditions encountered bank 2",
    "EGR monitor completions",
    "EGR monitor conditions encountered",
    "AIR monitor completions",
    "AIR monitor conditions encountered",
    "EVAP monitor completions",
    "EVAP monitor conditions encountered",
    "Secondary O2 sensor monitor completions bank 1",
    "Secondary O2 sensor monitor conditions encountered bank 1",
    "Secondary O2 sensor monitor completions bank 2",
    "Secondary O2 sensor monitor conditions encountered bank 2",
];

/// Mode 09 PID 0B.
pub const COMPRESSION_PERFORMANCE_COUNTERS: &[&str] = &[
    "OBD monitoring conditions encountered",
    "Ignition cycles",
    "NMHC catalyst monitor completions",
    "NMHC catalyst monitor conditions encountered",
    "NOx catalyst monitor completions",
    "NOx catalyst monitor conditions encountered",
    "NOx adsorber monitor completions",
    "NOx adsorber monitor conditions encountered",
    "PM filter monitor completions",
    "PM filter monitor conditions encountered",
    "Exhaust gas sensor monitor completions",
    "Exhaust gas sensor monitor conditions encountered",
    "EGR and/or VVT monitor completions",
    "EGR and/or VVT monitor conditions encountered",
    "Boost pressure monitor completions",
    "Boost pressure monitor conditions encountered",
    "Fuel monitor completions",
    "Fuel monitor conditions encountered",
];

/// Table lookup that reports unknown codes as `"Unknown"`.
pub fn lookup(table: &[(u8, &'static str)], code: u8) -> &'static str {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes() {
        assert_eq!(lookup(OBD_STANDARDS, 0x01), "OBD-II as defined by the CARB");
        assert_eq!(lookup(FUEL_TYPES, 0x04), "Diesel");
        assert_eq!(lookup(OBD_STANDARDS, 0xFE), "Unknown");
        assert_eq!(lookup(FUEL_TYPES, 0x99), "Unknown");
    }

    #[test]
    fn compression_bits_skip_reserved_names() {
        for i in COMPRESSION_MONITOR_BITS {
            assert!(!COMPRESSION_MONITORS[i].is_empty());
        }
    }
}
