//! Live device-state snapshot
//!
//! Device drivers write their latest readings here; catalog producers only
//! read. Units are the integer wire units (centivolts, deciamps, centidegrees)
//! so producers never convert.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub type SharedSnapshot = Arc<RwLock<StationSnapshot>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryState {
    pub voltage_cv: u16,
    pub current_da: i16,
    pub soc_pct: u8,
    pub temperature_c: i8,
    pub alarms: u16,
    pub remaining_ah: u16,
    pub time_to_go_min: u16,
    pub consumed_ah: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MpptState {
    pub pv_voltage_cv: u16,
    pub pv_power_w: u16,
    pub battery_current_da: i16,
    pub charge_state: u8,
    pub error_code: u8,
    pub yield_today_wh: u32,
    pub yield_total_kwh: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChargerMode {
    #[default]
    Off = 0,
    Auto = 1,
    Float = 2,
    Equalize = 3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargerState {
    pub mode: ChargerMode,
    pub temperature_c: i8,
    pub input_voltage_dv: u16,
    pub output_voltage_cv: u16,
    pub output_current_da: i16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InverterState {
    pub enabled: bool,
    pub load_pct: u8,
    pub output_power_w: u16,
    pub output_voltage_dv: u16,
    pub frequency_chz: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeneratorRun {
    #[default]
    Stopped = 0,
    Running = 1,
    TestRun = 2,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorState {
    pub run: GeneratorRun,
    pub fuel_pct: u8,
    pub rpm: u16,
    pub output_power_w: u16,
    pub alarms: u16,
    pub runtime_min: u32,
    pub starts: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrackerMode {
    #[default]
    Manual = 0,
    Automatic = 1,
    Parked = 2,
    Positioning = 3,
    Stopped = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum JogDirection {
    East = 0,
    West = 1,
    Up = 2,
    Down = 3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerState {
    pub mode: TrackerMode,
    pub wind_kmh: u8,
    pub azimuth_cdeg: i16,
    pub elevation_cdeg: i16,
    pub target_azimuth_cdeg: i16,
    pub target_elevation_cdeg: i16,
    pub last_jog: Option<JogDirection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SunPositionState {
    pub azimuth_cdeg: i16,
    pub elevation_cdeg: i16,
    pub sunrise_min: u16,
    pub sunset_min: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BankSelection {
    #[default]
    None = 0,
    BankA = 1,
    BankB = 2,
    Both = 3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelBankState {
    pub selection: BankSelection,
    pub bank_a_voltage_cv: u16,
    pub bank_b_voltage_cv: u16,
    pub bank_a_current_da: i16,
    pub bank_b_current_da: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SourceSelection {
    #[default]
    Grid = 0,
    Inverter = 1,
    Generator = 2,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerSourceState {
    pub selected: SourceSelection,
    pub grid_present: bool,
    pub grid_voltage_dv: u16,
}

/// Station clock kept as an offset from the host clock
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockState {
    pub offset_ms: i64,
}

impl ClockState {
    pub fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + Duration::milliseconds(self.offset_ms)
    }

    /// Offset rounded up to the next millisecond so the clock never reads
    /// earlier than `target`
    pub fn set(&mut self, target: NaiveDateTime) {
        let delta = target - Local::now().naive_local();
        let ms = delta.num_milliseconds();
        self.offset_ms = if delta > Duration::milliseconds(ms) { ms + 1 } else { ms };
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioState {
    pub muted: bool,
    pub volume_pct: u8,
    pub last_message: u8,
    pub last_sound: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayState {
    /// Bit n set = relay n energised
    pub mask: u16,
}

impl RelayState {
    pub fn set(&mut self, relay: u8, on: bool) -> bool {
        if relay >= 16 {
            return false;
        }
        if on {
            self.mask |= 1 << relay;
        } else {
            self.mask &= !(1 << relay);
        }
        true
    }

    pub fn is_on(&self, relay: u8) -> bool {
        relay < 16 && self.mask & (1 << relay) != 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub battery: BatteryState,
    pub mppt: MpptState,
    pub charger: ChargerState,
    pub inverter1: InverterState,
    pub inverter2: InverterState,
    pub generator: GeneratorState,
    pub tracker: TrackerState,
    pub sun: SunPositionState,
    pub panels: PanelBankState,
    pub source: PowerSourceState,
    pub clock: ClockState,
    pub audio: AudioState,
    pub relays: RelayState,
}

impl StationSnapshot {
    pub fn shared(self) -> SharedSnapshot {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_relay_mask() {
        let mut relays = RelayState::default();
        assert!(relays.set(3, true));
        assert!(relays.set(15, true));
        assert_eq!(relays.mask, 0x8008);
        assert!(relays.set(3, false));
        assert!(!relays.is_on(3));
        assert!(!relays.set(16, true));
        assert_eq!(relays.mask, 0x8000);
    }

    #[test]
    fn test_clock_offset() {
        let mut clock = ClockState::default();
        let target = NaiveDate::from_ymd_opt(2031, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        clock.set(target);
        assert!(clock.now() >= target);
        let drift = (clock.now() - target).num_milliseconds();
        assert!((0..1000).contains(&drift), "drift {} ms", drift);
    }
}
