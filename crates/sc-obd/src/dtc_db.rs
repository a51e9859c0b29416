//! Built-in DTC descriptions for common codes.
//!
//! Loaded into [`crate::catalog::StaticCatalog::with_defaults`]; a catalog
//! file can override or extend any entry.

/// `(code, description)` pairs. Codes are upper-case.
pub const DEFAULT_DTCS: &[(&str, &str)] = &[
    // Powertrain: Fuel and Air Metering
    ("P0100", "Mass or Volume Air Flow Circuit Malfunction"),
    ("P0101", "Mass or Volume Air Flow Circuit Range/Performance"),
    ("P0102", "Mass or Volume Air Flow Circuit Low Input"),
    ("P0103", "Mass or Volume Air Flow Circuit High Input"),
    ("P0110", "Intake Air Temperature Circuit Malfunction"),
    ("P0115", "Engine Coolant Temperature Circuit Malfunction"),
    ("P0116", "Engine Coolant Temperature Circuit Range/Performance"),
    ("P0117", "Engine Coolant Temperature Circuit Low Input"),
    ("P0118", "Engine Coolant Temperature Circuit High Input"),
    ("P0120", "Throttle Position Sensor Circuit Malfunction"),
    ("P0121", "Throttle Position Sensor Circuit Range/Performance"),
    ("P0122", "Throttle Position Sensor Circuit Low Input"),
    ("P0123", "Throttle Position Sensor Circuit High Input"),
    ("P0130", "O2 Sensor Circuit Malfunction (Bank 1, Sensor 1)"),
    ("P0131", "O2 Sensor Circuit Low Voltage (Bank 1, Sensor 1)"),
    ("P0133", "O2 Sensor Circuit Slow Response (Bank 1, Sensor 1)"),
    ("P0135", "O2 Sensor Heater Circuit Malfunction (Bank 1, Sensor 1)"),
    // Powertrain: Fuel and Air Metering (continued)
    ("P0170", "Fuel Trim Malfunction (Bank 1)"),
    ("P0171", "System Too Lean (Bank 1)"),
    ("P0172", "System Too Rich (Bank 1)"),
    ("P0174", "System Too Lean (Bank 2)"),
    ("P0175", "System Too Rich (Bank 2)"),
    // Powertrain: Ignition System
    ("P0300", "Random/Multiple Cylinder Misfire Detected"),
    ("P0301", "Cylinder 1 Misfire Detected"),
    ("P0302", "Cylinder 2 Misfire Detected"),
    ("P0303", "Cylinder 3 Misfire Detected"),
    ("P0304", "Cylinder 4 Misfire Detected"),
    ("P0305", "Cylinder 5 Misfire Detected"),
    ("P0306", "Cylinder 6 Misfire Detected"),
    ("P0335", "Crankshaft Position Sensor A Circuit Malfunction"),
    ("P0336", "Crankshaft Position Sensor A Circuit Range/Performance"),
    ("P0340", "Camshaft Position Sensor Circuit Malfunction"),
    // Powertrain: Emission Controls
    ("P0400", "Exhaust Gas Recirculation Flow Malfunction"),
    ("P0401", "Exhaust Gas Recirculation Flow Insufficient Detected"),
    ("P0420", "Catalyst System Efficiency Below Threshold (Bank 1)"),
    ("P0421", "Warm Up Catalyst Efficiency Below Threshold (Bank 1)"),
    ("P0430", "Catalyst System Efficiency Below Threshold (Bank 2)"),
    ("P0440", "Evaporative Emission Control System Malfunction"),
    ("P0441", "Evaporative Emission Control System Incorrect Purge Flow"),
    ("P0442", "Evaporative Emission Control System Leak Detected (small leak)"),
    ("P0443", "Evaporative Emission Control System Purge Control Valve Circuit"),
    ("P0446", "Evaporative Emission Control System Vent Control Circuit"),
    ("P0455", "Evaporative Emission Control System Leak Detected (large leak)"),
    // Powertrain: Vehicle Speed / Idle
    ("P0500", "Vehicle Speed Sensor Malfunction"),
    ("P0505", "Idle Control System Malfunction"),
    ("P0506", "Idle Control System RPM Lower Than Expected"),
    ("P0507", "Idle Control System RPM Higher Than Expected"),
    // Powertrain: Transmission
    ("P0700", "Transmission Control System Malfunction"),
    ("P0705", "Transmission Range Sensor Circuit Malfunction"),
    ("P0715", "Input/Turbine Speed Sensor Circuit Malfunction"),
    ("P0720", "Output Speed Sensor Circuit Malfunction"),
    ("P0730", "Incorrect Gear Ratio"),
    ("P0740", "Torque Converter Clutch Circuit Malfunction"),
    ("P0750", "Shift Solenoid A Malfunction"),
    ("P0755", "Shift Solenoid B Malfunction"),
    // Powertrain: Auxiliary Emission Controls
    ("P0A80", "Replace Hybrid Battery Pack"),
    // Chassis
    ("C0035", "Left Front Wheel Speed Sensor Circuit"),
    ("C0040", "Right Front Wheel Speed Sensor Circuit"),
    ("C0045", "Left Rear Wheel Speed Sensor Circuit"),
    ("C0050", "Right Rear Wheel Speed Sensor Circuit"),
    ("C0242", "PCM Indicated TCS Malfunction"),
    ("C0300", "Rear Speed Sensor Malfunction"),
    // Body
    ("B0100", "Electronic Frontal Sensor 1 Malfunction"),
    ("B0101", "Electronic Frontal Sensor 2 Malfunction"),
    ("B1000", "ECU Malfunction, Internal"),
    ("B1200", "Climate Control Push Button Circuit"),
    ("B1318", "Battery Voltage Low"),
    ("B1325", "Battery Voltage Out Of Range"),
    ("B1342", "ECU Malfunction"),
    ("B1601", "PATS Received Incorrect Key Code"),
    ("B2799", "Engine Immobilizer System Malfunction"),
    // Network/Communication
    ("U0001", "High Speed CAN Communication Bus"),
    ("U0073", "Control Module Communication Bus Off"),
    ("U0100", "Lost Communication With ECM/PCM"),
    ("U0101", "Lost Communication With TCM"),
    ("U0121", "Lost Communication With ABS"),
    ("U0140", "Lost Communication With Body Control Module"),
    ("U0155", "Lost Communication With Instrument Panel Cluster"),
    ("U0164", "Lost Communication With HVAC"),
    ("U0401", "Invalid Data Received From ECM/PCM"),
];

/// Look up a DTC code in the built-in table.
/// Input is case-insensitive (normalized to uppercase internally).
pub fn lookup(code: &str) -> Option<&'static str> {
    let code = code.to_uppercase();
    DEFAULT_DTCS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, d)| *d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_powertrain_code() {
        assert!(lookup("P0300").unwrap().contains("Misfire"));
    }

    #[test]
    fn known_network_code() {
        assert!(lookup("U0100").unwrap().contains("Lost Communication"));
    }

    #[test]
    fn unknown_code_returns_none() {
        assert!(lookup("P9999").is_none());
        assert!(lookup("XXXXX").is_none());
    }

    #[test]
    fn case_insensitive_lookup() {
        assert!(lookup("p0300").is_some());
        assert!(lookup("c0035").is_some());
    }

    #[test]
    fn codes_are_unique_and_well_formed() {
        let mut seen = std::collections::HashSet::new();
        for (code, _) in DEFAULT_DTCS {
            assert_eq!(code.len(), 5, "{code}");
            assert!(seen.insert(*code), "duplicate {code}");
        }
    }
}
