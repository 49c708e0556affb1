//! Direct device commands
//!
//! A command with parameter 0 selects its action by `(device, first payload
//! byte)`. The route table is scanned in order and the first match wins;
//! unmatched pairs are ignored. Remaining payload bytes are the action's
//! arguments.

use crate::error::Result;
use crate::protocol::{CommandMessage, DeviceId};
use crate::telemetry::snapshot::{
    BankSelection, ChargerMode, GeneratorRun, JogDirection, SourceSelection, TrackerMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    /// args: year-2000, month, day, hour, minute, second
    SetClock,
    SelectBanks(BankSelection),
    SetChargerMode(ChargerMode),
    SetInverter { unit: DeviceId, on: bool },
    SelectSource(SourceSelection),
    SetGenerator(GeneratorRun),
    SetTrackerMode(TrackerMode),
    ParkTracker,
    /// args: azimuth, elevation (centidegrees, i16 LE)
    MoveTracker,
    StopTracker,
    JogTracker(JogDirection),
    Mute,
    /// args: message number
    PlayVoice,
    /// args: sound number
    PlaySound,
    /// args: relay index, state (non-zero = on)
    SetRelay,
}

/// Device-control collaborator
pub trait DeviceControl: Send + Sync {
    fn perform(&self, device: DeviceId, action: DeviceAction, args: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub device: DeviceId,
    pub selector: u8,
    pub action: DeviceAction,
}

const fn route(device: DeviceId, selector: u8, action: DeviceAction) -> Route {
    Route {
        device,
        selector,
        action,
    }
}

pub static ROUTES: &[Route] = &[
    route(DeviceId::Rtc, 0x01, DeviceAction::SetClock),
    route(DeviceId::PanelBanks, 0x00, DeviceAction::SelectBanks(BankSelection::None)),
    route(DeviceId::PanelBanks, 0x01, DeviceAction::SelectBanks(BankSelection::BankA)),
    route(DeviceId::PanelBanks, 0x02, DeviceAction::SelectBanks(BankSelection::BankB)),
    route(DeviceId::PanelBanks, 0x03, DeviceAction::SelectBanks(BankSelection::Both)),
    route(DeviceId::Charger, 0x00, DeviceAction::SetChargerMode(ChargerMode::Off)),
    route(DeviceId::Charger, 0x01, DeviceAction::SetChargerMode(ChargerMode::Auto)),
    route(DeviceId::Charger, 0x02, DeviceAction::SetChargerMode(ChargerMode::Float)),
    route(DeviceId::Charger, 0x03, DeviceAction::SetChargerMode(ChargerMode::Equalize)),
    route(
        DeviceId::Inverter1,
        0x00,
        DeviceAction::SetInverter {
            unit: DeviceId::Inverter1,
            on: false,
        },
    ),
    route(
        DeviceId::Inverter1,
        0x01,
        DeviceAction::SetInverter {
            unit: DeviceId::Inverter1,
            on: true,
        },
    ),
    route(
        DeviceId::Inverter2,
        0x00,
        DeviceAction::SetInverter {
            unit: DeviceId::Inverter2,
            on: false,
        },
    ),
    route(
        DeviceId::Inverter2,
        0x01,
        DeviceAction::SetInverter {
            unit: DeviceId::Inverter2,
            on: true,
        },
    ),
    route(DeviceId::PowerSource, 0x00, DeviceAction::SelectSource(SourceSelection::Grid)),
    route(DeviceId::PowerSource, 0x01, DeviceAction::SelectSource(SourceSelection::Inverter)),
    route(DeviceId::PowerSource, 0x02, DeviceAction::SelectSource(SourceSelection::Generator)),
    route(DeviceId::Generator, 0x00, DeviceAction::SetGenerator(GeneratorRun::Stopped)),
    route(DeviceId::Generator, 0x01, DeviceAction::SetGenerator(GeneratorRun::Running)),
    route(DeviceId::Generator, 0x02, DeviceAction::SetGenerator(GeneratorRun::TestRun)),
    route(DeviceId::Tracker, 0x00, DeviceAction::SetTrackerMode(TrackerMode::Manual)),
    route(DeviceId::Tracker, 0x01, DeviceAction::SetTrackerMode(TrackerMode::Automatic)),
    route(DeviceId::Tracker, 0x02, DeviceAction::ParkTracker),
    route(DeviceId::Tracker, 0x03, DeviceAction::MoveTracker),
    route(DeviceId::Tracker, 0x04, DeviceAction::StopTracker),
    route(DeviceId::Tracker, 0x05, DeviceAction::JogTracker(JogDirection::East)),
    route(DeviceId::Tracker, 0x06, DeviceAction::JogTracker(JogDirection::West)),
    route(DeviceId::Tracker, 0x07, DeviceAction::JogTracker(JogDirection::Up)),
    route(DeviceId::Tracker, 0x08, DeviceAction::JogTracker(JogDirection::Down)),
    route(DeviceId::Audio, 0x00, DeviceAction::Mute),
    route(DeviceId::Audio, 0x01, DeviceAction::PlayVoice),
    route(DeviceId::Audio, 0x02, DeviceAction::PlaySound),
    route(DeviceId::Relays, 0x01, DeviceAction::SetRelay),
];

/// First route matching the message's device and selector byte
pub fn lookup(message: &CommandMessage) -> Option<(DeviceId, DeviceAction)> {
    let selector = message.first_byte()?;
    ROUTES
        .iter()
        .find(|r| r.device.raw() == message.device && r.selector == selector)
        .map(|r| (r.device, r.action))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocol::WireAddress;

    fn cmd(device: u8, data: &[u8]) -> CommandMessage {
        let mut scratch = [0u8; 8];
        scratch[..data.len()].copy_from_slice(data);
        CommandMessage::from_parts(WireAddress::new(device, 0, 0), &scratch, data.len() as u8)
    }

    #[test]
    fn test_generator_start() {
        assert_eq!(
            lookup(&cmd(0x06, &[0x01])),
            Some((DeviceId::Generator, DeviceAction::SetGenerator(GeneratorRun::Running)))
        );
    }

    #[test]
    fn test_unmatched_pairs_ignored() {
        assert_eq!(lookup(&cmd(0x06, &[0x09])), None);
        assert_eq!(lookup(&cmd(0x7F, &[0x00])), None);
        assert_eq!(lookup(&cmd(0x06, &[])), None);
    }

    #[test]
    fn test_routes_unique() {
        for (i, a) in ROUTES.iter().enumerate() {
            assert!(
                ROUTES[i + 1..]
                    .iter()
                    .all(|b| (b.device, b.selector) != (a.device, a.selector)),
                "duplicate route {} {:#04x}",
                a.device,
                a.selector
            );
        }
    }

    #[test]
    fn test_every_tracker_selector_routed() {
        for selector in 0x00..=0x08 {
            assert!(lookup(&cmd(0x07, &[selector])).is_some(), "{:#04x}", selector);
        }
    }
}
