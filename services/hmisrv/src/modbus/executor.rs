//! MODBUS request execution
//!
//! The tunnel hands a decoded [`ModbusRequest`] to a [`ModbusExecutor`] and
//! gets back a status plus response data. [`execute_with_retry`] wraps any
//! executor in the bounded retry policy.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Outcome of one tunnelled request, as carried in the answer header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusStatus {
    Ok = 0,
    CrcError = 1,
    Timeout = 2,
    Exception = 3,
    InvalidRequest = 4,
    PortError = 5,
}

impl ModbusStatus {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Line faults worth another attempt
    #[inline]
    pub const fn is_retryable(self) -> bool {
        matches!(self, ModbusStatus::CrcError | ModbusStatus::Timeout)
    }
}

impl fmt::Display for ModbusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModbusStatus::Ok => "ok",
            ModbusStatus::CrcError => "crc-error",
            ModbusStatus::Timeout => "timeout",
            ModbusStatus::Exception => "exception",
            ModbusStatus::InvalidRequest => "invalid-request",
            ModbusStatus::PortError => "port-error",
        };
        f.write_str(name)
    }
}

/// Decoded tunnel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub slave: u8,
    pub function: u8,
    pub register: u16,
    pub count: u16,
    /// Bytes following the request header (write values)
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusReply {
    pub status: ModbusStatus,
    /// Read data, write echo, or the exception code for `Exception`
    pub data: Vec<u8>,
}

impl ModbusReply {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            status: ModbusStatus::Ok,
            data,
        }
    }

    pub fn failure(status: ModbusStatus) -> Self {
        Self {
            status,
            data: Vec::new(),
        }
    }

    pub fn exception(code: u8) -> Self {
        Self {
            status: ModbusStatus::Exception,
            data: vec![code],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ModbusStatus::Ok
    }
}

/// Field-bus side of the tunnel
#[async_trait]
pub trait ModbusExecutor: Send {
    /// Perform one attempt; never retries internally
    async fn execute(&mut self, request: &ModbusRequest) -> ModbusReply;

    fn name(&self) -> &str;
}

/// Run `request` up to `attempts` times, retrying only CRC and timeout
/// failures. Returns the last reply and the number of attempts made.
pub async fn execute_with_retry(
    executor: &mut dyn ModbusExecutor,
    request: &ModbusRequest,
    attempts: usize,
) -> (ModbusReply, usize) {
    let attempts = attempts.max(1);
    let mut made = 0;
    loop {
        made += 1;
        let reply = executor.execute(request).await;
        if reply.is_ok() {
            debug!(
                slave = request.slave,
                function = request.function,
                attempt = made,
                "MODBUS request completed: {} bytes",
                reply.data.len()
            );
            return (reply, made);
        }
        if !reply.status.is_retryable() || made >= attempts {
            warn!(
                slave = request.slave,
                function = request.function,
                status = %reply.status,
                attempt = made,
                "MODBUS request failed"
            );
            return (reply, made);
        }
        debug!(
            slave = request.slave,
            status = %reply.status,
            "MODBUS attempt {}/{} failed, retrying",
            made,
            attempts
        );
    }
}
