//! Telemetry catalog
//!
//! Ordered table of every telemetry frame the station publishes. Each entry
//! owns an 8-byte buffer; its producer refreshes that buffer from the live
//! snapshot right before the frame is sent. The table layout is fixed once
//! built and only the dispatcher holds it.

use bytes::BufMut;
use chrono::{Datelike, Timelike};

use super::snapshot::StationSnapshot;
use crate::protocol::constants::MAX_FRAME_DATA;
use crate::protocol::DeviceId;

/// Fills one catalog buffer from the snapshot (little-endian fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    BatteryLevels,
    BatteryCapacity,
    MpptPower,
    MpptYield,
    Charger,
    Inverter1,
    Inverter2,
    GeneratorStatus,
    GeneratorHours,
    TrackerPosition,
    TrackerTarget,
    SunPosition,
    PanelVoltages,
    PanelCurrents,
    PowerSource,
    Clock,
    Audio,
    Relays,
}

impl Producer {
    pub fn refresh(self, snapshot: &StationSnapshot, buffer: &mut [u8; MAX_FRAME_DATA]) {
        let mut out = &mut buffer[..];
        match self {
            Producer::BatteryLevels => {
                let b = &snapshot.battery;
                out.put_u16_le(b.voltage_cv);
                out.put_i16_le(b.current_da);
                out.put_u8(b.soc_pct);
                out.put_i8(b.temperature_c);
                out.put_u16_le(b.alarms);
            },
            Producer::BatteryCapacity => {
                let b = &snapshot.battery;
                out.put_u16_le(b.remaining_ah);
                out.put_u16_le(b.time_to_go_min);
                out.put_i32_le(b.consumed_ah);
            },
            Producer::MpptPower => {
                let m = &snapshot.mppt;
                out.put_u16_le(m.pv_voltage_cv);
                out.put_u16_le(m.pv_power_w);
                out.put_i16_le(m.battery_current_da);
                out.put_u8(m.charge_state);
                out.put_u8(m.error_code);
            },
            Producer::MpptYield => {
                out.put_u32_le(snapshot.mppt.yield_today_wh);
                out.put_u32_le(snapshot.mppt.yield_total_kwh);
            },
            Producer::Charger => {
                let c = &snapshot.charger;
                out.put_u8(c.mode as u8);
                out.put_i8(c.temperature_c);
                out.put_u16_le(c.input_voltage_dv);
                out.put_u16_le(c.output_voltage_cv);
                out.put_i16_le(c.output_current_da);
            },
            Producer::Inverter1 | Producer::Inverter2 => {
                let inv = if self == Producer::Inverter1 {
                    &snapshot.inverter1
                } else {
                    &snapshot.inverter2
                };
                out.put_u8(u8::from(inv.enabled));
                out.put_u8(inv.load_pct);
                out.put_u16_le(inv.output_power_w);
                out.put_u16_le(inv.output_voltage_dv);
                out.put_u16_le(inv.frequency_chz);
            },
            Producer::GeneratorStatus => {
                let g = &snapshot.generator;
                out.put_u8(g.run as u8);
                out.put_u8(g.fuel_pct);
                out.put_u16_le(g.rpm);
                out.put_u16_le(g.output_power_w);
                out.put_u16_le(g.alarms);
            },
            Producer::GeneratorHours => {
                out.put_u32_le(snapshot.generator.runtime_min);
                out.put_u16_le(snapshot.generator.starts);
            },
            Producer::TrackerPosition => {
                let t = &snapshot.tracker;
                out.put_u8(t.mode as u8);
                out.put_u8(t.wind_kmh);
                out.put_i16_le(t.azimuth_cdeg);
                out.put_i16_le(t.elevation_cdeg);
            },
            Producer::TrackerTarget => {
                out.put_i16_le(snapshot.tracker.target_azimuth_cdeg);
                out.put_i16_le(snapshot.tracker.target_elevation_cdeg);
            },
            Producer::SunPosition => {
                let s = &snapshot.sun;
                out.put_i16_le(s.azimuth_cdeg);
                out.put_i16_le(s.elevation_cdeg);
                out.put_u16_le(s.sunrise_min);
                out.put_u16_le(s.sunset_min);
            },
            Producer::PanelVoltages => {
                let p = &snapshot.panels;
                out.put_u8(p.selection as u8);
                out.put_u16_le(p.bank_a_voltage_cv);
                out.put_u16_le(p.bank_b_voltage_cv);
            },
            Producer::PanelCurrents => {
                out.put_i16_le(snapshot.panels.bank_a_current_da);
                out.put_i16_le(snapshot.panels.bank_b_current_da);
            },
            Producer::PowerSource => {
                let s = &snapshot.source;
                out.put_u8(s.selected as u8);
                out.put_u8(u8::from(s.grid_present));
                out.put_u16_le(s.grid_voltage_dv);
            },
            Producer::Clock => {
                let now = snapshot.clock.now();
                out.put_u8((now.year() - 2000).clamp(0, 255) as u8);
                out.put_u8(now.month() as u8);
                out.put_u8(now.day() as u8);
                out.put_u8(now.hour() as u8);
                out.put_u8(now.minute() as u8);
                out.put_u8(now.second() as u8);
                out.put_u8(now.weekday().num_days_from_monday() as u8);
            },
            Producer::Audio => {
                let a = &snapshot.audio;
                out.put_u8(u8::from(a.muted));
                out.put_u8(a.volume_pct);
                out.put_u8(a.last_message);
                out.put_u8(a.last_sound);
            },
            Producer::Relays => out.put_u16_le(snapshot.relays.mask),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub device: DeviceId,
    pub subpacket: u8,
    pub producer: Option<Producer>,
    pub buffer: [u8; MAX_FRAME_DATA],
    pub length: u8,
}

impl CatalogEntry {
    pub const fn new(device: DeviceId, subpacket: u8, producer: Option<Producer>, length: u8) -> Self {
        Self {
            device,
            subpacket,
            producer,
            buffer: [0u8; MAX_FRAME_DATA],
            length,
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.length as usize]
    }
}

pub struct TelemetryCatalog {
    entries: Vec<CatalogEntry>,
}

impl TelemetryCatalog {
    /// Station telemetry table; order here is wire order
    pub fn standard() -> Self {
        use DeviceId::*;
        use Producer as P;

        Self::from_entries(vec![
            CatalogEntry::new(BatteryMonitor, 0, Some(P::BatteryLevels), 8),
            CatalogEntry::new(BatteryMonitor, 1, Some(P::BatteryCapacity), 8),
            CatalogEntry::new(Mppt, 0, Some(P::MpptPower), 8),
            CatalogEntry::new(Mppt, 1, Some(P::MpptYield), 8),
            CatalogEntry::new(Charger, 0, Some(P::Charger), 8),
            CatalogEntry::new(Inverter1, 0, Some(P::Inverter1), 8),
            CatalogEntry::new(Inverter2, 0, Some(P::Inverter2), 8),
            CatalogEntry::new(Generator, 0, Some(P::GeneratorStatus), 8),
            CatalogEntry::new(Generator, 1, Some(P::GeneratorHours), 6),
            CatalogEntry::new(Tracker, 0, Some(P::TrackerPosition), 6),
            CatalogEntry::new(Tracker, 1, Some(P::TrackerTarget), 4),
            CatalogEntry::new(SunPosition, 0, Some(P::SunPosition), 8),
            CatalogEntry::new(PanelBanks, 0, Some(P::PanelVoltages), 5),
            CatalogEntry::new(PanelBanks, 1, Some(P::PanelCurrents), 4),
            CatalogEntry::new(PowerSource, 0, Some(P::PowerSource), 4),
            CatalogEntry::new(Rtc, 0, Some(P::Clock), 7),
            CatalogEntry::new(Audio, 0, Some(P::Audio), 4),
            CatalogEntry::new(Relays, 0, Some(P::Relays), 2),
            // event notification slot
            CatalogEntry::new(Log, 0, None, 0),
        ])
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut e| {
                e.length = e.length.min(MAX_FRAME_DATA as u8);
                e
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries of `device`, in table order
    pub fn entries_mut(&mut self, device: DeviceId) -> impl Iterator<Item = &mut CatalogEntry> {
        self.entries.iter_mut().filter(move |e| e.device == device)
    }

    /// Devices with produced telemetry, first-appearance order
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if entry.producer.is_some() && !seen.contains(&entry.device) {
                seen.push(entry.device);
            }
        }
        seen
    }
}
