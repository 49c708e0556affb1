//! 29-bit wire address codec
//!
//! ```text
//!  28      24 23          16 15           8 7            0
//! ┌──────────┬──────────────┬──────────────┬──────────────┐
//! │ reserved │    device    │  parameter   │  sub-packet  │
//! └──────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! For the log device the low byte is an event code, not a sub-packet; see
//! [`EventAddress`].

use super::constants::FILTER_MESS;
use super::device::LOG_ID;

const DEVICE_SHIFT: u32 = 16;
const PARAMETER_SHIFT: u32 = 8;
const SUBPACKET_SHIFT: u32 = 0;
const FIELD_MASK: u32 = 0xFF;

/// Pack the three address fields into a wire identifier
#[inline]
pub const fn encode(device: u8, parameter: u8, subpacket: u8) -> u32 {
    ((device as u32) << DEVICE_SHIFT)
        | ((parameter as u32) << PARAMETER_SHIFT)
        | ((subpacket as u32) << SUBPACKET_SHIFT)
}

/// Split a wire identifier into `(device, parameter, subpacket)`
#[inline]
pub const fn decode(id: u32) -> (u8, u8, u8) {
    (
        ((id >> DEVICE_SHIFT) & FIELD_MASK) as u8,
        ((id >> PARAMETER_SHIFT) & FIELD_MASK) as u8,
        ((id >> SUBPACKET_SHIFT) & FIELD_MASK) as u8,
    )
}

/// Decoded data/command address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireAddress {
    pub device: u8,
    pub parameter: u8,
    pub subpacket: u8,
}

impl WireAddress {
    pub const fn new(device: u8, parameter: u8, subpacket: u8) -> Self {
        Self {
            device,
            parameter,
            subpacket,
        }
    }

    #[inline]
    pub const fn to_id(self) -> u32 {
        encode(self.device, self.parameter, self.subpacket)
    }

    #[inline]
    pub const fn from_id(id: u32) -> Self {
        let (device, parameter, subpacket) = decode(id);
        Self::new(device, parameter, subpacket)
    }
}

/// Event notification address: message identifier plus an event code in the
/// low byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventAddress {
    /// Identifier with the low byte cleared (`id & FILTER_MESS`)
    pub message_id: u32,
    pub code: u8,
}

impl EventAddress {
    pub const fn from_id(id: u32) -> Self {
        Self {
            message_id: id & FILTER_MESS,
            code: (id & FIELD_MASK) as u8,
        }
    }

    /// Event identifier emitted towards the HMI for `code`
    pub const fn for_code(code: u8) -> Self {
        Self {
            message_id: encode(LOG_ID, 0, 0),
            code,
        }
    }

    #[inline]
    pub const fn to_id(self) -> u32 {
        (self.message_id & FILTER_MESS) | self.code as u32
    }
}

/// One received identifier, interpreted according to its device class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressed {
    Event(EventAddress),
    Data(WireAddress),
}

impl Addressed {
    pub const fn classify(id: u32) -> Self {
        let address = WireAddress::from_id(id);
        if address.device == LOG_ID {
            Addressed::Event(EventAddress::from_id(id))
        } else {
            Addressed::Data(address)
        }
    }
}
