//! MODBUS-over-CAN tunnel framing
//!
//! Requests arrive as a sequence of frames on the MODBUS request device.
//! Sub-packet 0 carries the 8-byte header (slave, function, register,
//! count, total length; multi-byte fields little-endian) and starts a new
//! reassembly; later frames append until the declared total length is
//! reached. A partial request with no continuation stays pending until the
//! next sub-packet 0 replaces it.
//!
//! Answers travel the other way with an 8-byte header of their own:
//! status, slave, register, count, total length.

use bytes::BufMut;
use tracing::{debug, warn};

use super::executor::{ModbusReply, ModbusRequest, ModbusStatus};
use crate::protocol::constants::{
    ANSWER_HEADER_LEN, MAX_FRAME_DATA, TUNNEL_CAPACITY, TUNNEL_HEADER_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelPhase {
    Idle,
    Accumulating,
    Ready,
}

/// Result of feeding one frame into the reassembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelProgress {
    /// Continuation frame with no request in progress
    Ignored,
    Accumulating { remaining: u16 },
    Ready,
}

/// Fields echoed back in every answer header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerEcho {
    pub slave: u8,
    pub register: u16,
    pub count: u16,
}

impl From<&ModbusRequest> for AnswerEcho {
    fn from(request: &ModbusRequest) -> Self {
        Self {
            slave: request.slave,
            register: request.register,
            count: request.count,
        }
    }
}

/// Request reassembly state, owned by the command processor
pub struct TunnelState {
    buffer: Box<[u8; TUNNEL_CAPACITY]>,
    remaining: u16,
    write_offset: u16,
    phase: TunnelPhase,
    /// Declared length exceeded the buffer; request is rejected when taken
    oversized: bool,
}

impl Default for TunnelState {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelState {
    pub fn new() -> Self {
        Self {
            buffer: Box::new([0u8; TUNNEL_CAPACITY]),
            remaining: 0,
            write_offset: 0,
            phase: TunnelPhase::Idle,
            oversized: false,
        }
    }

    pub fn phase(&self) -> TunnelPhase {
        self.phase
    }

    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    pub fn received(&self) -> &[u8] {
        &self.buffer[..self.write_offset as usize]
    }

    pub fn reset(&mut self) {
        self.remaining = 0;
        self.write_offset = 0;
        self.phase = TunnelPhase::Idle;
        self.oversized = false;
    }

    /// Feed one frame of the request device
    pub fn accept(&mut self, subpacket: u8, data: &[u8]) -> TunnelProgress {
        let data = &data[..data.len().min(MAX_FRAME_DATA)];

        if subpacket == 0 {
            if self.phase == TunnelPhase::Accumulating {
                debug!(
                    "Tunnel request restarted with {} bytes outstanding",
                    self.remaining
                );
            }
            self.reset();
            self.buffer[..data.len()].copy_from_slice(data);
            self.write_offset = data.len() as u16;

            let declared = if data.len() >= TUNNEL_HEADER_LEN {
                u16::from_le_bytes([data[6], data[7]])
            } else {
                data.len() as u16
            };
            if declared as usize > TUNNEL_CAPACITY {
                warn!(
                    "Tunnel request declares {} bytes, capacity {}",
                    declared, TUNNEL_CAPACITY
                );
                self.oversized = true;
                self.phase = TunnelPhase::Ready;
                return TunnelProgress::Ready;
            }

            self.remaining = declared.saturating_sub(self.write_offset);
            if self.remaining == 0 {
                self.phase = TunnelPhase::Ready;
                return TunnelProgress::Ready;
            }
            self.phase = TunnelPhase::Accumulating;
            return TunnelProgress::Accumulating {
                remaining: self.remaining,
            };
        }

        if self.phase != TunnelPhase::Accumulating {
            return TunnelProgress::Ignored;
        }

        let take = data.len().min(self.remaining as usize);
        let start = self.write_offset as usize;
        self.buffer[start..start + take].copy_from_slice(&data[..take]);
        self.write_offset += take as u16;
        self.remaining -= take as u16;

        if self.remaining == 0 {
            self.phase = TunnelPhase::Ready;
            TunnelProgress::Ready
        } else {
            TunnelProgress::Accumulating {
                remaining: self.remaining,
            }
        }
    }

    /// Decode the finished request and return to idle.
    ///
    /// A request that cannot be decoded yields the echo for an
    /// invalid-request answer.
    pub fn take_request(&mut self) -> std::result::Result<ModbusRequest, AnswerEcho> {
        let result = self.decode();
        self.reset();
        result
    }

    fn decode(&self) -> std::result::Result<ModbusRequest, AnswerEcho> {
        let raw = self.received();
        let echo = echo_from_partial(raw);
        if self.phase != TunnelPhase::Ready || self.oversized || raw.len() < TUNNEL_HEADER_LEN {
            return Err(echo);
        }
        Ok(ModbusRequest {
            slave: raw[0],
            function: raw[1],
            register: u16::from_le_bytes([raw[2], raw[3]]),
            count: u16::from_le_bytes([raw[4], raw[5]]),
            payload: raw[TUNNEL_HEADER_LEN..].to_vec(),
        })
    }
}

fn echo_from_partial(raw: &[u8]) -> AnswerEcho {
    let byte = |i: usize| raw.get(i).copied().unwrap_or(0);
    AnswerEcho {
        slave: byte(0),
        register: u16::from_le_bytes([byte(2), byte(3)]),
        count: u16::from_le_bytes([byte(4), byte(5)]),
    }
}

/// Finished answer waiting for fragmentation by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelAnswer {
    status: ModbusStatus,
    /// Answer header followed by response data
    bytes: Vec<u8>,
}

impl TunnelAnswer {
    pub fn from_reply(echo: AnswerEcho, reply: &ModbusReply) -> Self {
        if !reply.is_ok() {
            if reply.status == ModbusStatus::Exception {
                warn!(
                    slave = echo.slave,
                    "MODBUS exception code {:#04x}",
                    reply.data.first().copied().unwrap_or(0)
                );
            }
            return Self::error(echo, reply.status);
        }
        if ANSWER_HEADER_LEN + reply.data.len() > TUNNEL_CAPACITY {
            warn!(
                slave = echo.slave,
                "MODBUS response of {} bytes exceeds answer capacity",
                reply.data.len()
            );
            return Self::error(echo, ModbusStatus::InvalidRequest);
        }

        let total = ANSWER_HEADER_LEN + reply.data.len();
        let mut bytes = Vec::with_capacity(total);
        put_header(&mut bytes, ModbusStatus::Ok, echo, total as u16);
        bytes.extend_from_slice(&reply.data);
        Self {
            status: ModbusStatus::Ok,
            bytes,
        }
    }

    /// Header-only answer
    pub fn error(echo: AnswerEcho, status: ModbusStatus) -> Self {
        let mut bytes = Vec::with_capacity(ANSWER_HEADER_LEN);
        put_header(&mut bytes, status, echo, ANSWER_HEADER_LEN as u16);
        Self { status, bytes }
    }

    pub fn status(&self) -> ModbusStatus {
        self.status
    }

    pub fn header(&self) -> &[u8] {
        &self.bytes[..ANSWER_HEADER_LEN]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn put_header(out: &mut Vec<u8>, status: ModbusStatus, echo: AnswerEcho, total: u16) {
    out.put_u8(status.code());
    out.put_u8(echo.slave);
    out.put_u16_le(echo.register);
    out.put_u16_le(echo.count);
    out.put_u16_le(total);
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn header(slave: u8, function: u8, register: u16, count: u16, total: u16) -> [u8; 8] {
        let r = register.to_le_bytes();
        let c = count.to_le_bytes();
        let t = total.to_le_bytes();
        [slave, function, r[0], r[1], c[0], c[1], t[0], t[1]]
    }

    #[test]
    fn test_three_frame_reassembly() {
        let mut tunnel = TunnelState::new();
        let total = 18u16;

        let p = tunnel.accept(0, &header(1, 0x10, 0x0100, 5, total));
        assert_eq!(p, TunnelProgress::Accumulating { remaining: 10 });
        let p = tunnel.accept(1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(p, TunnelProgress::Accumulating { remaining: 2 });
        let p = tunnel.accept(2, &[9, 10]);
        assert_eq!(p, TunnelProgress::Ready);

        let request = tunnel.take_request().unwrap();
        assert_eq!(request.slave, 1);
        assert_eq!(request.function, 0x10);
        assert_eq!(request.register, 0x0100);
        assert_eq!(request.count, 5);
        assert_eq!(request.payload, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(tunnel.phase(), TunnelPhase::Idle);
    }

    #[test]
    fn test_single_frame_request_ready_at_once() {
        let mut tunnel = TunnelState::new();
        assert_eq!(tunnel.accept(0, &header(2, 3, 0, 4, 8)), TunnelProgress::Ready);
        let request = tunnel.take_request().unwrap();
        assert!(request.payload.is_empty());
    }

    #[test]
    fn test_declared_shorter_than_header_is_ready() {
        let mut tunnel = TunnelState::new();
        assert_eq!(tunnel.accept(0, &header(2, 3, 0, 4, 3)), TunnelProgress::Ready);
        assert!(tunnel.take_request().is_ok());
    }

    #[test]
    fn test_continuation_without_start_ignored() {
        let mut tunnel = TunnelState::new();
        assert_eq!(tunnel.accept(1, &[1, 2, 3]), TunnelProgress::Ignored);
        assert_eq!(tunnel.phase(), TunnelPhase::Idle);
    }

    #[test]
    fn test_new_start_discards_stale_partial() {
        let mut tunnel = TunnelState::new();
        tunnel.accept(0, &header(1, 0x10, 0, 4, 30));
        tunnel.accept(1, &[0xAA; 8]);
        assert_eq!(tunnel.phase(), TunnelPhase::Accumulating);

        assert_eq!(tunnel.accept(0, &header(7, 3, 9, 1, 8)), TunnelProgress::Ready);
        let request = tunnel.take_request().unwrap();
        assert_eq!(request.slave, 7);
        assert!(request.payload.is_empty());
    }

    #[test]
    fn test_excess_bytes_in_last_frame_dropped() {
        let mut tunnel = TunnelState::new();
        tunnel.accept(0, &header(1, 0x10, 0, 1, 10));
        assert_eq!(tunnel.accept(1, &[1, 2, 3, 4]), TunnelProgress::Ready);
        assert_eq!(tunnel.take_request().unwrap().payload, vec![1, 2]);
    }

    #[test]
    fn test_oversized_request_rejected_with_echo() {
        let mut tunnel = TunnelState::new();
        let declared = (TUNNEL_CAPACITY + 1) as u16;
        assert_eq!(
            tunnel.accept(0, &header(4, 0x10, 0x20, 3, declared)),
            TunnelProgress::Ready
        );
        let echo = tunnel.take_request().unwrap_err();
        assert_eq!(
            echo,
            AnswerEcho {
                slave: 4,
                register: 0x20,
                count: 3
            }
        );
        // stray continuation after rejection
        assert_eq!(tunnel.accept(1, &[0; 8]), TunnelProgress::Ignored);
    }

    #[test]
    fn test_short_header_rejected() {
        let mut tunnel = TunnelState::new();
        assert_eq!(tunnel.accept(0, &[1, 3, 0]), TunnelProgress::Ready);
        assert!(tunnel.take_request().is_err());
    }

    #[test]
    fn test_answer_layout() {
        let echo = AnswerEcho {
            slave: 1,
            register: 0x0102,
            count: 6,
        };
        let answer = TunnelAnswer::from_reply(echo, &ModbusReply::ok((0..12).collect()));
        assert_eq!(answer.len(), 20);
        assert_eq!(answer.header(), &[0, 1, 0x02, 0x01, 6, 0, 20, 0]);
        assert_eq!(&answer.bytes()[8..], &(0..12).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn test_failed_reply_is_header_only() {
        let echo = AnswerEcho {
            slave: 9,
            register: 0x10,
            count: 2,
        };
        let answer = TunnelAnswer::from_reply(echo, &ModbusReply::exception(2));
        assert_eq!(answer.status(), ModbusStatus::Exception);
        assert_eq!(answer.bytes(), &[3, 9, 0x10, 0, 2, 0, 8, 0]);
    }
}
