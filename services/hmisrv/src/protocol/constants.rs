//! HMI link wire constants
//!
//! Every value here is part of the wire contract with the HMI controller and
//! must not change without a matching HMI firmware update.

// ============================================================================
// Frame Constants
// ============================================================================

/// Maximum payload of one classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// Largest identifier representable in an extended (29-bit) CAN frame
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Strips the low address byte, leaving device and parameter.
///
/// Event notifications reuse the low byte as an event code, so filtering
/// with this mask recovers the message identifier shared by all events.
pub const FILTER_MESS: u32 = 0x1FFF_FF00;

// ============================================================================
// Queue Capacities
// ============================================================================

/// Pull-request (trigger) queue feeding the outbound dispatcher
pub const TRIGGER_QUEUE_CAPACITY: usize = 128;

/// Command queue feeding the command processor
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

// ============================================================================
// Configuration Parameters
// ============================================================================

/// Sub-packet value that commits the whole configuration to durable storage
pub const CONFIG_COMMIT_SUBPACKET: u8 = 0xFF;

/// String parameters travel as two 8-byte halves
pub const CONFIG_STAGING_LEN: usize = 2 * MAX_FRAME_DATA;

// ============================================================================
// MODBUS Tunnel
// ============================================================================

/// Attempts made for one tunnelled MODBUS request before giving up.
///
/// Only CRC mismatches and timeouts consume another attempt.
pub const CNT_REPEAT_REQST: usize = 3;

/// Request header carried in sub-packet 0:
/// slave(1) + function(1) + register address(2) + register count(2) + total length(2)
pub const TUNNEL_HEADER_LEN: usize = 8;

/// Answer header preceding the response data:
/// status(1) + slave(1) + register address(2) + register count(2) + total length(2)
pub const ANSWER_HEADER_LEN: usize = 8;

/// Reassembly buffer capacity for one request or one answer
pub const TUNNEL_CAPACITY: usize = 2048;
