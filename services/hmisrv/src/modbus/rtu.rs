//! MODBUS RTU executor over a serial port

use std::time::Duration;

use async_trait::async_trait;
use bytes::BufMut;
use crc::{Crc, CRC_16_MODBUS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};
use tracing::{debug, info, trace, warn};

use super::executor::{ModbusExecutor, ModbusReply, ModbusRequest, ModbusStatus};
use crate::config::SerialConfig;
use crate::error::{HmiSrvError, Result};
use crate::transport::link::hex_bytes;

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Largest RTU ADU
const MAX_ADU: usize = 256;
const EXCEPTION_ADU_LEN: usize = 5;
const WRITE_ECHO_ADU_LEN: usize = 8;

pub struct RtuExecutor {
    port: SerialStream,
    path: String,
    timeout: Duration,
}

impl RtuExecutor {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let builder = tokio_serial::new(&config.path, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(parity(&config.parity))
            .timeout(Duration::from_millis(config.timeout_ms));

        let port = SerialStream::open(&builder)
            .map_err(|e| HmiSrvError::io(format!("serial {}: {}", config.path, e)))?;
        info!(
            "MODBUS RTU port {} opened at {} baud",
            config.path, config.baud_rate
        );

        Ok(Self {
            port,
            path: config.path.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn transact(&mut self, adu: &[u8], function: u8, count: u16) -> ModbusReply {
        if let Err(e) = self.port.clear(ClearBuffer::Input) {
            debug!("Serial input flush failed on {}: {}", self.path, e);
        }

        trace!("RTU TX [{}]: {}", self.path, hex_bytes(adu));
        if let Err(e) = self.port.write_all(adu).await {
            warn!("Serial write failed on {}: {}", self.path, e);
            return ModbusReply::failure(ModbusStatus::PortError);
        }

        let mut frame = [0u8; MAX_ADU];
        let mut filled = 0usize;
        let mut expected = normal_response_len(function, count);
        let deadline = Instant::now() + self.timeout;

        while filled < expected {
            let left = deadline.saturating_duration_since(Instant::now());
            let read = match timeout(left, self.port.read(&mut frame[filled..])).await {
                Ok(Ok(0)) | Err(_) => {
                    debug!("RTU timeout on {} after {} bytes", self.path, filled);
                    return ModbusReply::failure(ModbusStatus::Timeout);
                },
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!("Serial read failed on {}: {}", self.path, e);
                    return ModbusReply::failure(ModbusStatus::PortError);
                },
            };
            filled += read;
            if filled >= 2 && frame[1] & 0x80 != 0 {
                expected = EXCEPTION_ADU_LEN;
            }
        }

        trace!("RTU RX [{}]: {}", self.path, hex_bytes(&frame[..filled]));
        parse_response(&frame[..expected], adu[0], function)
    }
}

#[async_trait]
impl ModbusExecutor for RtuExecutor {
    async fn execute(&mut self, request: &ModbusRequest) -> ModbusReply {
        let adu = match build_request(request) {
            Some(adu) => adu,
            None => return ModbusReply::failure(ModbusStatus::InvalidRequest),
        };
        self.transact(&adu, request.function, request.count).await
    }

    fn name(&self) -> &str {
        "rtu"
    }
}

/// Request ADU with trailing CRC, or `None` if the request cannot be framed
pub fn build_request(request: &ModbusRequest) -> Option<Vec<u8>> {
    let mut adu = Vec::with_capacity(MAX_ADU);
    adu.put_u8(request.slave);
    adu.put_u8(request.function);
    adu.put_u16(request.register);

    match request.function {
        0x01..=0x04 => {
            if request.count == 0 || normal_response_len(request.function, request.count) > MAX_ADU {
                return None;
            }
            adu.put_u16(request.count);
        },
        0x05 | 0x06 => {
            adu.extend_from_slice(request.payload.get(..2)?);
        },
        0x0F | 0x10 => {
            let bytes = if request.function == 0x0F {
                request.count.div_ceil(8) as usize
            } else {
                request.count as usize * 2
            };
            if request.count == 0 || request.payload.len() < bytes || bytes > 246 {
                return None;
            }
            adu.put_u16(request.count);
            adu.put_u8(bytes as u8);
            adu.extend_from_slice(&request.payload[..bytes]);
        },
        _ => return None,
    }

    let crc = MODBUS_CRC.checksum(&adu);
    adu.put_u16_le(crc);
    Some(adu)
}

fn normal_response_len(function: u8, count: u16) -> usize {
    match function {
        0x01 | 0x02 => 5 + count.div_ceil(8) as usize,
        0x03 | 0x04 => 5 + count as usize * 2,
        _ => WRITE_ECHO_ADU_LEN,
    }
}

/// Validate a complete response ADU and extract its data
pub fn parse_response(adu: &[u8], slave: u8, function: u8) -> ModbusReply {
    if adu.len() < EXCEPTION_ADU_LEN {
        return ModbusReply::failure(ModbusStatus::CrcError);
    }
    let (body, tail) = adu.split_at(adu.len() - 2);
    if MODBUS_CRC.checksum(body) != u16::from_le_bytes([tail[0], tail[1]]) {
        return ModbusReply::failure(ModbusStatus::CrcError);
    }
    if body[0] != slave || body[1] & 0x7F != function {
        // garbled or foreign frame that happens to pass CRC
        return ModbusReply::failure(ModbusStatus::CrcError);
    }
    if body[1] & 0x80 != 0 {
        return ModbusReply::exception(body[2]);
    }

    match function {
        0x01..=0x04 => {
            let count = body[2] as usize;
            match body.get(3..3 + count) {
                Some(data) => ModbusReply::ok(data.to_vec()),
                None => ModbusReply::failure(ModbusStatus::CrcError),
            }
        },
        _ => match body.get(2..6) {
            Some(echo) => ModbusReply::ok(echo.to_vec()),
            None => ModbusReply::failure(ModbusStatus::CrcError),
        },
    }
}

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

fn parity(name: &str) -> Parity {
    match name.to_ascii_lowercase().as_str() {
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => Parity::None,
    }
}
