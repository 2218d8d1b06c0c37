//! Device classification: class-of-device to kind, protocol label
//! derivation. Pure functions, deterministic for identical inputs.

use btbat_platform::{Peripheral, PropertyValue, PROP_LE_CONNECTABLE, PROP_PROTOCOL_ID};
use btbat_protocol::DeviceKind;

pub const LABEL_BLE: &str = "BLE (4.0+)";
pub const LABEL_CLASSIC_VERSIONED: &str = "Classic (2.0/3.0)";
pub const LABEL_CLASSIC: &str = "Classic";

/// Maps a raw class-of-device word to a coarse kind. The major device class
/// occupies bits 8-12.
pub fn kind_for_class(class_of_device: Option<u32>) -> DeviceKind {
    let Some(class_of_device) = class_of_device else {
        return DeviceKind::Unknown;
    };
    match (class_of_device >> 8) & 0x1f {
        0x01 => DeviceKind::Computer,
        0x02 => DeviceKind::Phone,
        0x04 => DeviceKind::AudioVideo,
        0x05 => DeviceKind::Peripheral,
        _ => DeviceKind::Unknown,
    }
}

/// Derives the protocol version label.
///
/// `answers_le` reflects whether the device answered under the low-energy
/// profile during this poll; otherwise the property bag is consulted for an
/// explicit LE-connectable flag or a Bluetooth protocol identifier, with a
/// generic "Classic" fallback.
pub fn protocol_label(peripheral: &Peripheral, answers_le: bool) -> String {
    if answers_le {
        return LABEL_BLE.to_string();
    }

    if let Some(PropertyValue::Bool(true)) = peripheral.property(PROP_LE_CONNECTABLE) {
        return LABEL_BLE.to_string();
    }

    if let Some(protocol_id) = peripheral
        .property(PROP_PROTOCOL_ID)
        .and_then(PropertyValue::as_text)
    {
        if protocol_id.to_lowercase().contains("bluetooth") {
            return LABEL_CLASSIC_VERSIONED.to_string();
        }
    }

    LABEL_CLASSIC.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peripheral_with(key: &str, value: PropertyValue) -> Peripheral {
        let mut peripheral = Peripheral::default();
        peripheral.properties.insert(key.to_string(), value);
        peripheral
    }

    #[test]
    fn test_major_class_mapping() {
        // Major class lives in bits 8-12: 0x240404 is audio/video (headset).
        assert_eq!(kind_for_class(Some(0x240404)), DeviceKind::AudioVideo);
        assert_eq!(kind_for_class(Some(0x000100)), DeviceKind::Computer);
        assert_eq!(kind_for_class(Some(0x000200)), DeviceKind::Phone);
        assert_eq!(kind_for_class(Some(0x000580)), DeviceKind::Peripheral);
        assert_eq!(kind_for_class(Some(0x000300)), DeviceKind::Unknown);
        assert_eq!(kind_for_class(None), DeviceKind::Unknown);
    }

    #[test]
    fn test_classifier_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(kind_for_class(Some(0x000580)), DeviceKind::Peripheral);
        }
    }

    #[test]
    fn test_le_answer_wins() {
        let peripheral = peripheral_with(PROP_PROTOCOL_ID, PropertyValue::Text("x".to_string()));
        assert_eq!(protocol_label(&peripheral, true), LABEL_BLE);
    }

    #[test]
    fn test_le_connectable_flag() {
        let peripheral = peripheral_with(PROP_LE_CONNECTABLE, PropertyValue::Bool(true));
        assert_eq!(protocol_label(&peripheral, false), LABEL_BLE);

        let peripheral = peripheral_with(PROP_LE_CONNECTABLE, PropertyValue::Bool(false));
        assert_eq!(protocol_label(&peripheral, false), LABEL_CLASSIC);
    }

    #[test]
    fn test_bluetooth_protocol_id_yields_versioned_classic() {
        let peripheral = peripheral_with(
            PROP_PROTOCOL_ID,
            PropertyValue::Text("Bluetooth-classic".to_string()),
        );
        assert_eq!(protocol_label(&peripheral, false), LABEL_CLASSIC_VERSIONED);
    }

    #[test]
    fn test_no_signal_defaults_to_classic() {
        assert_eq!(protocol_label(&Peripheral::default(), false), LABEL_CLASSIC);
    }
}
