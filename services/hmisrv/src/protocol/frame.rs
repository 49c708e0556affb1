//! Frames and the messages derived from them

use std::fmt;

use super::address::WireAddress;
use super::constants::MAX_FRAME_DATA;
use super::device::DeviceId;
use crate::modbus::tunnel::TunnelAnswer;

/// Displays a wire identifier as 8-digit hex, e.g. `0x00200301`
#[derive(Debug, Clone, Copy)]
pub struct HexId(pub u32);

impl fmt::Display for HexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// One extended-id CAN frame as exchanged with the link driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub data: [u8; MAX_FRAME_DATA],
    pub len: u8,
    /// Remote transmission request: no data, asks the receiver to answer
    pub remote: bool,
}

impl CanFrame {
    /// Data frame; payload beyond 8 bytes is truncated
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_FRAME_DATA);
        let mut data = [0u8; MAX_FRAME_DATA];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            data,
            len: len as u8,
            remote: false,
        }
    }

    /// Remote-read request for `id`
    pub fn remote(id: u32) -> Self {
        Self {
            id,
            data: [0u8; MAX_FRAME_DATA],
            len: 0,
            remote: true,
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(MAX_FRAME_DATA)]
    }
}

/// One received command frame, owned by the command processor once queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMessage {
    pub device: u8,
    pub parameter: u8,
    pub subpacket: u8,
    pub length: u8,
    pub payload: [u8; MAX_FRAME_DATA],
}

impl CommandMessage {
    pub fn from_parts(address: WireAddress, scratch: &[u8; MAX_FRAME_DATA], length: u8) -> Self {
        Self {
            device: address.device,
            parameter: address.parameter,
            subpacket: address.subpacket,
            length: length.min(MAX_FRAME_DATA as u8),
            payload: *scratch,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.length as usize]
    }

    /// Selector of direct device commands
    #[inline]
    pub fn first_byte(&self) -> Option<u8> {
        self.data().first().copied()
    }

    pub fn address(&self) -> WireAddress {
        WireAddress::new(self.device, self.parameter, self.subpacket)
    }
}

/// Work item of the outbound dispatcher
#[derive(Debug)]
pub enum Trigger {
    /// Refresh and emit every catalog entry of a device
    Device(DeviceId),
    /// Emit the current configuration values
    Config,
    /// Emit an event notification carrying this code
    Event(u8),
    /// Fragment a finished MODBUS answer onto the bus
    ModbusAnswer(Box<TunnelAnswer>),
}
