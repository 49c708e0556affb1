//! Logical bus participants

use std::fmt;

/// 8-bit device identifier carried in bits 16..24 of every wire address.
///
/// Id 0 means "no device" and is never a valid command target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DeviceId {
    BatteryMonitor = 0x01,
    Mppt = 0x02,
    Charger = 0x03,
    Inverter1 = 0x04,
    Inverter2 = 0x05,
    Generator = 0x06,
    Tracker = 0x07,
    SunPosition = 0x08,
    PanelBanks = 0x09,
    PowerSource = 0x0A,
    Rtc = 0x0B,
    Audio = 0x0C,
    Relays = 0x0D,
    Config = 0x20,
    ModbusRequest = 0x21,
    ModbusAnswer = 0x22,
    Log = 0x30,
    Hmi = 0x40,
}

/// Raw id of the configuration device
pub const CONFIG_ID: u8 = DeviceId::Config as u8;

/// Raw id of the event/log device
pub const LOG_ID: u8 = DeviceId::Log as u8;

impl DeviceId {
    pub const ALL: [DeviceId; 18] = [
        DeviceId::BatteryMonitor,
        DeviceId::Mppt,
        DeviceId::Charger,
        DeviceId::Inverter1,
        DeviceId::Inverter2,
        DeviceId::Generator,
        DeviceId::Tracker,
        DeviceId::SunPosition,
        DeviceId::PanelBanks,
        DeviceId::PowerSource,
        DeviceId::Rtc,
        DeviceId::Audio,
        DeviceId::Relays,
        DeviceId::Config,
        DeviceId::ModbusRequest,
        DeviceId::ModbusAnswer,
        DeviceId::Log,
        DeviceId::Hmi,
    ];

    #[inline]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.raw() == raw)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DeviceId::BatteryMonitor => "battery-monitor",
            DeviceId::Mppt => "mppt",
            DeviceId::Charger => "charger",
            DeviceId::Inverter1 => "inverter-1",
            DeviceId::Inverter2 => "inverter-2",
            DeviceId::Generator => "generator",
            DeviceId::Tracker => "tracker",
            DeviceId::SunPosition => "sun-position",
            DeviceId::PanelBanks => "panel-banks",
            DeviceId::PowerSource => "power-source",
            DeviceId::Rtc => "rtc",
            DeviceId::Audio => "audio",
            DeviceId::Relays => "relays",
            DeviceId::Config => "config",
            DeviceId::ModbusRequest => "modbus-request",
            DeviceId::ModbusAnswer => "modbus-answer",
            DeviceId::Log => "log",
            DeviceId::Hmi => "hmi",
        }
    }
}

impl TryFrom<u8> for DeviceId {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or(raw)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.raw())
    }
}
