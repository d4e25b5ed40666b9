//! Cloud serial ↔ peripheral identifier translation.
//!
//! The cloud registers a sensor under a 16-hex-digit serial that embeds the
//! 12-digit radio address with a `0000` filler after the vendor prefix:
//!
//! ```text
//! serial      A0143D 0000 08B4C7
//! peripheral  a0143d      08b4c7
//! ```
//!
//! Serials that do not follow that layout are passed through lowercased,
//! because peripherals advertise lowercase identifiers. The mapping is
//! therefore one-to-one only up to ASCII case: `SN1` and `sn1` name the same
//! peripheral.

const VENDOR_LEN: usize = 6;
const FILLER: &str = "0000";

/// Translate a cloud sensor serial into the identifier the peripheral
/// advertises.
pub fn serial_to_peripheral(serial: &str) -> String {
    let serial = serial.trim();
    if is_packed_serial(serial) {
        let (vendor, rest) = serial.split_at(VENDOR_LEN);
        format!("{}{}", vendor, &rest[FILLER.len()..]).to_ascii_lowercase()
    } else {
        serial.to_ascii_lowercase()
    }
}

/// Inverse of [`serial_to_peripheral`] for 12-digit radio addresses.
pub fn peripheral_to_serial(peripheral: &str) -> String {
    let peripheral = peripheral.trim();
    if peripheral.len() == 12 && peripheral.chars().all(|c| c.is_ascii_hexdigit()) {
        let (vendor, rest) = peripheral.split_at(VENDOR_LEN);
        format!("{vendor}{FILLER}{rest}").to_ascii_uppercase()
    } else {
        peripheral.to_ascii_uppercase()
    }
}

fn is_packed_serial(serial: &str) -> bool {
    serial.len() == 16
        && serial.chars().all(|c| c.is_ascii_hexdigit())
        && &serial[VENDOR_LEN..VENDOR_LEN + FILLER.len()] == FILLER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_filler_and_lowercases() {
        assert_eq!(serial_to_peripheral("A0143D000008B4C7"), "a0143d08b4c7");
    }

    #[test]
    fn unknown_layout_passes_through_lowercased() {
        assert_eq!(serial_to_peripheral("SN1"), "sn1");
        // 16 digits but no filler: nothing is removed
        assert_eq!(
            serial_to_peripheral("A0143D123408B4C7"),
            "a0143d123408b4c7"
        );
    }

    #[test]
    fn distinct_serials_stay_distinct() {
        let a = serial_to_peripheral("A0143D000008B4C7");
        let b = serial_to_peripheral("A0143D000008B4C8");
        assert_ne!(a, b);
    }

    #[test]
    fn serials_differing_only_in_case_share_a_peripheral() {
        assert_eq!(serial_to_peripheral("SN1"), serial_to_peripheral("sn1"));
        assert_eq!(
            serial_to_peripheral("A0143D000008B4C7"),
            serial_to_peripheral("a0143d000008b4c7")
        );
    }

    #[test]
    fn peripheral_maps_back_to_serial() {
        assert_eq!(peripheral_to_serial("a0143d08b4c7"), "A0143D000008B4C7");
        assert_eq!(
            serial_to_peripheral(&peripheral_to_serial("9003b7e8b2a5")),
            "9003b7e8b2a5"
        );
    }
}
