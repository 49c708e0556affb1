//! Device control backed by the station snapshot
//!
//! Applies each action to the shared device state, where the device drivers
//! pick it up and the next telemetry cycle reports it.

use chrono::NaiveDate;
use tracing::info;

use super::dispatch::{DeviceAction, DeviceControl};
use crate::error::{HmiSrvError, Result};
use crate::protocol::DeviceId;
use crate::telemetry::snapshot::{GeneratorRun, SharedSnapshot, TrackerMode};

pub struct SnapshotControl {
    snapshot: SharedSnapshot,
}

impl SnapshotControl {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }
}

fn arg(args: &[u8], index: usize, action: DeviceAction) -> Result<u8> {
    args.get(index)
        .copied()
        .ok_or_else(|| HmiSrvError::validation(format!("{:?}: missing argument {}", action, index)))
}

fn arg_i16(args: &[u8], index: usize, action: DeviceAction) -> Result<i16> {
    Ok(i16::from_le_bytes([
        arg(args, index, action)?,
        arg(args, index + 1, action)?,
    ]))
}

impl DeviceControl for SnapshotControl {
    fn perform(&self, device: DeviceId, action: DeviceAction, args: &[u8]) -> Result<()> {
        // multi-byte arguments are decoded before the state lock is taken
        let clock = match action {
            DeviceAction::SetClock => {
                let field = |i| arg(args, i, action);
                let date = NaiveDate::from_ymd_opt(
                    2000 + i32::from(field(0)?),
                    u32::from(field(1)?),
                    u32::from(field(2)?),
                )
                .and_then(|d| {
                    d.and_hms_opt(
                        u32::from(field(3).ok()?),
                        u32::from(field(4).ok()?),
                        u32::from(field(5).ok()?),
                    )
                })
                .ok_or_else(|| HmiSrvError::validation("invalid date/time".to_string()))?;
                Some(date)
            },
            _ => None,
        };
        let target = match action {
            DeviceAction::MoveTracker => Some((arg_i16(args, 0, action)?, arg_i16(args, 2, action)?)),
            _ => None,
        };

        let mut s = self.snapshot.write();
        match action {
            DeviceAction::SetClock => {
                if let Some(when) = clock {
                    s.clock.set(when);
                }
            },
            DeviceAction::SelectBanks(selection) => s.panels.selection = selection,
            DeviceAction::SetChargerMode(mode) => s.charger.mode = mode,
            DeviceAction::SetInverter { unit, on } => {
                if unit == DeviceId::Inverter2 {
                    s.inverter2.enabled = on;
                } else {
                    s.inverter1.enabled = on;
                }
            },
            DeviceAction::SelectSource(source) => s.source.selected = source,
            DeviceAction::SetGenerator(run) => {
                if run != GeneratorRun::Stopped && s.generator.run == GeneratorRun::Stopped {
                    s.generator.starts = s.generator.starts.saturating_add(1);
                }
                s.generator.run = run;
            },
            DeviceAction::SetTrackerMode(mode) => s.tracker.mode = mode,
            DeviceAction::ParkTracker => {
                s.tracker.mode = TrackerMode::Parked;
                s.tracker.target_azimuth_cdeg = 0;
                s.tracker.target_elevation_cdeg = 0;
            },
            DeviceAction::MoveTracker => {
                if let Some((azimuth, elevation)) = target {
                    s.tracker.mode = TrackerMode::Positioning;
                    s.tracker.target_azimuth_cdeg = azimuth;
                    s.tracker.target_elevation_cdeg = elevation;
                }
            },
            DeviceAction::StopTracker => s.tracker.mode = TrackerMode::Stopped,
            DeviceAction::JogTracker(direction) => {
                s.tracker.mode = TrackerMode::Manual;
                s.tracker.last_jog = Some(direction);
            },
            DeviceAction::Mute => s.audio.muted = true,
            DeviceAction::PlayVoice => {
                s.audio.last_message = arg(args, 0, action)?;
                s.audio.muted = false;
            },
            DeviceAction::PlaySound => {
                s.audio.last_sound = arg(args, 0, action)?;
                s.audio.muted = false;
            },
            DeviceAction::SetRelay => {
                let relay = arg(args, 0, action)?;
                let on = arg(args, 1, action)? != 0;
                if !s.relays.set(relay, on) {
                    return Err(HmiSrvError::validation(format!("no relay {}", relay)));
                }
            },
        }
        drop(s);

        info!("{}: {:?} done", device, action);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::telemetry::snapshot::{JogDirection, StationSnapshot};
    use chrono::{Datelike, Timelike};

    fn control() -> (SnapshotControl, SharedSnapshot) {
        let snapshot = StationSnapshot::default().shared();
        (SnapshotControl::new(snapshot.clone()), snapshot)
    }

    #[test]
    fn test_generator_start_counts() {
        let (ctl, snap) = control();
        ctl.perform(DeviceId::Generator, DeviceAction::SetGenerator(GeneratorRun::Running), &[])
            .unwrap();
        ctl.perform(DeviceId::Generator, DeviceAction::SetGenerator(GeneratorRun::Running), &[])
            .unwrap();
        let s = snap.read();
        assert_eq!(s.generator.run, GeneratorRun::Running);
        assert_eq!(s.generator.starts, 1);
    }

    #[test]
    fn test_move_tracker_reads_le_targets() {
        let (ctl, snap) = control();
        let mut args = Vec::new();
        args.extend_from_slice(&18_000i16.to_le_bytes());
        args.extend_from_slice(&(-500i16).to_le_bytes());
        ctl.perform(DeviceId::Tracker, DeviceAction::MoveTracker, &args).unwrap();

        let s = snap.read();
        assert_eq!(s.tracker.mode, TrackerMode::Positioning);
        assert_eq!(s.tracker.target_azimuth_cdeg, 18_000);
        assert_eq!(s.tracker.target_elevation_cdeg, -500);
    }

    #[test]
    fn test_short_arguments_change_nothing() {
        let (ctl, snap) = control();
        assert!(ctl
            .perform(DeviceId::Tracker, DeviceAction::MoveTracker, &[1, 2, 3])
            .is_err());
        assert_eq!(snap.read().tracker.mode, TrackerMode::Manual);
    }

    #[test]
    fn test_set_clock() {
        let (ctl, snap) = control();
        ctl.perform(DeviceId::Rtc, DeviceAction::SetClock, &[31, 12, 24, 18, 30, 0])
            .unwrap();
        let now = snap.read().clock.now();
        assert_eq!((now.year(), now.month(), now.day()), (2031, 12, 24));
        assert_eq!((now.hour(), now.minute(), now.second()), (18, 30, 0));
    }

    #[test]
    fn test_invalid_clock_rejected() {
        let (ctl, _) = control();
        assert!(ctl
            .perform(DeviceId::Rtc, DeviceAction::SetClock, &[31, 2, 30, 0, 0, 0])
            .is_err());
    }

    #[test]
    fn test_relay_and_jog() {
        let (ctl, snap) = control();
        ctl.perform(DeviceId::Relays, DeviceAction::SetRelay, &[4, 1]).unwrap();
        assert!(ctl.perform(DeviceId::Relays, DeviceAction::SetRelay, &[20, 1]).is_err());
        ctl.perform(DeviceId::Tracker, DeviceAction::JogTracker(JogDirection::Up), &[])
            .unwrap();

        let s = snap.read();
        assert!(s.relays.is_on(4));
        assert_eq!(s.tracker.last_jog, Some(JogDirection::Up));
    }
}
