//! Built-in parameter definitions for the common SAE J1979 PIDs.
//!
//! Same shape as a catalog file row: key, data byte count, then one or
//! more `(label, min, max, unit, formula)` sensors. Special-cased PIDs
//! (bitmaps, status words, text) carry an empty formula because the
//! decoder never evaluates one for them.

/// `(label, min, max, unit, formula)`.
pub type SensorRow = (&'static str, f64, f64, &'static str, &'static str);

/// `(mode+pid key, data bytes, sensors)`.
pub type PidRow = (&'static str, usize, &'static [SensorRow]);

const FUEL_TRIM: &str = "(A-128)*100/128.0";
const PERCENT: &str = "A*100/255.0";
const TEMPERATURE: &str = "A-40";
const WORD: &str = "(A*256)+B";

macro_rules! o2_sensor {
    ($key:literal, $name:literal) => {
        (
            $key,
            2,
            &[
                (concat!($name, " voltage"), 0.0, 1.275, "V", "A/200.0"),
                (concat!($name, " short term fuel trim"), -100.0, 99.22, "%", "(B-128)*100/128.0"),
            ],
        )
    };
}

pub const DEFAULT_PIDS: &[PidRow] = &[
    // Mode 01
    ("0100", 4, &[("PIDs supported [01 - 20]", 0.0, 0.0, "", "")]),
    ("0101", 4, &[("Monitor status since DTCs cleared", 0.0, 0.0, "", "")]),
    ("0102", 2, &[("Freeze DTC", 0.0, 0.0, "", "")]),
    ("0103", 2, &[("Fuel system status", 0.0, 0.0, "", "")]),
    ("0104", 1, &[("Calculated engine load", 0.0, 100.0, "%", PERCENT)]),
    ("0105", 1, &[("Engine coolant temperature", -40.0, 215.0, "°C", TEMPERATURE)]),
    ("0106", 1, &[("Short term fuel trim Bank 1", -100.0, 99.22, "%", FUEL_TRIM)]),
    ("0107", 1, &[("Long term fuel trim Bank 1", -100.0, 99.22, "%", FUEL_TRIM)]),
    ("0108", 1, &[("Short term fuel trim Bank 2", -100.0, 99.22, "%", FUEL_TRIM)]),
    ("0109", 1, &[("Long term fuel trim Bank 2", -100.0, 99.22, "%", FUEL_TRIM)]),
    ("010A", 1, &[("Fuel pressure", 0.0, 765.0, "kPa", "A*3")]),
    ("010B", 1, &[("Intake manifold absolute pressure", 0.0, 255.0, "kPa", "A")]),
    ("010C", 2, &[("Engine RPM", 0.0, 16383.75, "rpm", "((A*256)+B)/4.0")]),
    ("010D", 1, &[("Vehicle speed", 0.0, 255.0, "km/h", "A")]),
    ("010E", 1, &[("Timing advance", -64.0, 63.5, "°", "A/2.0-64")]),
    ("010F", 1, &[("Intake air temperature", -40.0, 215.0, "°C", TEMPERATURE)]),
    ("0110", 2, &[("MAF air flow rate", 0.0, 655.35, "g/s", "((A*256)+B)/100.0")]),
    ("0111", 1, &[("Throttle position", 0.0, 100.0, "%", PERCENT)]),
    ("0112", 1, &[("Commanded secondary air status", 0.0, 0.0, "", "")]),
    ("0113", 1, &[("Oxygen sensors present", 0.0, 0.0, "", "")]),
    o2_sensor!("0114", "Bank 1, Sensor 1"),
    o2_sensor!("0115", "Bank 1, Sensor 2"),
    o2_sensor!("0116", "Bank 1, Sensor 3"),
    o2_sensor!("0117", "Bank 1, Sensor 4"),
    o2_sensor!("0118", "Bank 2, Sensor 1"),
    o2_sensor!("0119", "Bank 2, Sensor 2"),
    o2_sensor!("011A", "Bank 2, Sensor 3"),
    o2_sensor!("011B", "Bank 2, Sensor 4"),
    ("011C", 1, &[("OBD standards this vehicle conforms to", 0.0, 0.0, "", "")]),
    ("011D", 1, &[("Oxygen sensors present", 0.0, 0.0, "", "")]),
    ("011E", 1, &[("Auxiliary input status", 0.0, 1.0, "", "A/1")]),
    ("011F", 2, &[("Run time since engine start", 0.0, 65535.0, "s", WORD)]),
    ("0120", 4, &[("PIDs supported [21 - 40]", 0.0, 0.0, "", "")]),
    ("0121", 2, &[("Distance traveled with MIL on", 0.0, 65535.0, "km", WORD)]),
    ("0122", 2, &[("Fuel rail pressure (relative to manifold vacuum)", 0.0, 5177.265, "kPa", "((A*256)+B)*0.079")]),
    ("0123", 2, &[("Fuel rail pressure (diesel)", 0.0, 655350.0, "kPa", "((A*256)+B)*10")]),
    ("012C", 1, &[("Commanded EGR", 0.0, 100.0, "%", PERCENT)]),
    ("012D", 1, &[("EGR error", -100.0, 99.22, "%", FUEL_TRIM)]),
    ("012E", 1, &[("Commanded evaporative purge", 0.0, 100.0, "%", PERCENT)]),
    ("012F", 1, &[("Fuel level input", 0.0, 100.0, "%", PERCENT)]),
    ("0130", 1, &[("Number of warm-ups since codes cleared", 0.0, 255.0, "", "A")]),
    ("0131", 2, &[("Distance traveled since codes cleared", 0.0, 65535.0, "km", WORD)]),
    ("0133", 1, &[("Barometric pressure", 0.0, 255.0, "kPa", "A")]),
    ("013C", 2, &[("Catalyst temperature Bank 1, Sensor 1", -40.0, 6513.5, "°C", "((A*256)+B)/10.0-40")]),
    ("0140", 4, &[("PIDs supported [41 - 60]", 0.0, 0.0, "", "")]),
    ("0141", 4, &[("Monitor status this drive cycle", 0.0, 0.0, "", "")]),
    ("0142", 2, &[("Control module voltage", 0.0, 65.535, "V", "((A*256)+B)/1000.0")]),
    ("0143", 2, &[("Absolute load value", 0.0, 25700.0, "%", "((A*256)+B)*100/255.0")]),
    ("0145", 1, &[("Relative throttle position", 0.0, 100.0, "%", PERCENT)]),
    ("0146", 1, &[("Ambient air temperature", -40.0, 215.0, "°C", TEMPERATURE)]),
    ("0147", 1, &[("Absolute throttle position B", 0.0, 100.0, "%", PERCENT)]),
    ("0149", 1, &[("Accelerator pedal position D", 0.0, 100.0, "%", PERCENT)]),
    ("014A", 1, &[("Accelerator pedal position E", 0.0, 100.0, "%", PERCENT)]),
    ("014C", 1, &[("Commanded throttle actuator", 0.0, 100.0, "%", PERCENT)]),
    ("014D", 2, &[("Time run with MIL on", 0.0, 65535.0, "min", WORD)]),
    ("014E", 2, &[("Time since trouble codes cleared", 0.0, 65535.0, "min", WORD)]),
    ("0151", 1, &[("Fuel type", 0.0, 0.0, "", "")]),
    ("0152", 1, &[("Ethanol fuel", 0.0, 100.0, "%", PERCENT)]),
    ("015C", 1, &[("Engine oil temperature", -40.0, 210.0, "°C", TEMPERATURE)]),
    ("0160", 4, &[("PIDs supported [61 - 80]", 0.0, 0.0, "", "")]),
    ("0180", 4, &[("PIDs supported [81 - A0]", 0.0, 0.0, "", "")]),
    ("01A0", 4, &[("PIDs supported [A1 - C0]", 0.0, 0.0, "", "")]),
    ("01C0", 4, &[("PIDs supported [C1 - E0]", 0.0, 0.0, "", "")]),
    ("01E0", 4, &[("PIDs supported [E1 - FF]", 0.0, 0.0, "", "")]),
    // Mode 05 / 06
    ("0500", 4, &[("Test IDs supported [01 - 20]", 0.0, 0.0, "", "")]),
    ("0600", 4, &[("Monitor IDs supported [01 - 20]", 0.0, 0.0, "", "")]),
    ("0620", 4, &[("Monitor IDs supported [21 - 40]", 0.0, 0.0, "", "")]),
    ("0640", 4, &[("Monitor IDs supported [41 - 60]", 0.0, 0.0, "", "")]),
    // Mode 09
    ("0900", 4, &[("Mode 9 PIDs supported [01 - 20]", 0.0, 0.0, "", "")]),
    ("0901", 1, &[("VIN message count", 0.0, 255.0, "", "A")]),
    ("0902", 17, &[("Vehicle Identification Number", 0.0, 0.0, "", "")]),
    ("0903", 1, &[("Calibration ID message count", 0.0, 255.0, "", "A")]),
    ("0904", 16, &[("Calibration ID", 0.0, 0.0, "", "")]),
    ("0905", 1, &[("CVN message count", 0.0, 255.0, "", "A")]),
    ("0906", 4, &[("Calibration Verification Numbers", 0.0, 0.0, "", "")]),
    ("0907", 1, &[("In-use performance tracking message count", 0.0, 255.0, "", "A")]),
    ("0908", 32, &[("In-use performance tracking (spark ignition)", 0.0, 0.0, "", "")]),
    ("0909", 1, &[("ECU name message count", 0.0, 255.0, "", "A")]),
    ("090A", 20, &[("ECU name", 0.0, 0.0, "", "")]),
    ("090B", 32, &[("In-use performance tracking (compression ignition)", 0.0, 0.0, "", "")]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Formula;

    #[test]
    fn keys_are_unique_and_normalized() {
        let mut seen = std::collections::HashSet::new();
        for (key, _, _) in DEFAULT_PIDS {
            assert_eq!(key.len(), 4, "{key}");
            assert_eq!(*key, key.to_uppercase());
            assert!(seen.insert(*key), "duplicate {key}");
        }
    }

    #[test]
    fn every_formula_compiles_and_fits_the_byte_count() {
        for (key, bytes, sensors) in DEFAULT_PIDS {
            assert!(!sensors.is_empty(), "{key}");
            for (label, min, max, _, formula) in sensors.iter() {
                if formula.is_empty() {
                    continue;
                }
                let f = Formula::compile(formula).unwrap_or_else(|e| panic!("{key} {label}: {e}"));
                let zeros = vec![0u8; *bytes];
                let v = f.eval(&zeros).unwrap().as_f64();
                assert!(v >= *min && v <= *max, "{key} {label}: {v} outside [{min}, {max}]");
            }
        }
    }
}
