//! In-memory MODBUS slave
//!
//! Used when no serial port is configured and by the tests. Clones share the
//! same register bank, so a test can keep a handle while the processor owns
//! the executor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BufMut;
use parking_lot::Mutex;
use tracing::debug;

use super::executor::{ModbusExecutor, ModbusReply, ModbusRequest, ModbusStatus};

const EXC_ILLEGAL_FUNCTION: u8 = 0x01;
const EXC_ILLEGAL_ADDRESS: u8 = 0x02;
const EXC_ILLEGAL_VALUE: u8 = 0x03;

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_REGISTERS: u16 = 125;

#[derive(Default)]
struct Bank {
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    forced_status: Option<ModbusStatus>,
    attempts: usize,
}

#[derive(Clone)]
pub struct ModbusSimulator {
    slave: u8,
    bank: Arc<Mutex<Bank>>,
}

impl ModbusSimulator {
    pub fn new(slave: u8) -> Self {
        Self {
            slave,
            bank: Arc::new(Mutex::new(Bank::default())),
        }
    }

    /// Registers `1..=100` hold `i * 10`, inputs `i * 5`, even coils set
    pub fn with_test_data(self) -> Self {
        {
            let mut bank = self.bank.lock();
            for i in 1..=100u16 {
                bank.holding_registers.insert(i, i * 10);
                bank.input_registers.insert(i, i * 5);
                bank.coils.insert(i, i % 2 == 0);
                bank.discrete_inputs.insert(i, i % 3 == 0);
            }
        }
        self
    }

    pub fn set_holding(&self, register: u16, value: u16) {
        self.bank.lock().holding_registers.insert(register, value);
    }

    pub fn holding(&self, register: u16) -> u16 {
        self.bank
            .lock()
            .holding_registers
            .get(&register)
            .copied()
            .unwrap_or(0)
    }

    pub fn coil(&self, address: u16) -> bool {
        self.bank.lock().coils.get(&address).copied().unwrap_or(false)
    }

    /// Every following attempt fails with `status` until cleared with `None`
    pub fn force_status(&self, status: Option<ModbusStatus>) {
        self.bank.lock().forced_status = status;
    }

    pub fn attempts(&self) -> usize {
        self.bank.lock().attempts
    }

    fn read_bits(map: &HashMap<u16, bool>, start: u16, count: u16) -> ModbusReply {
        if count == 0 || count > MAX_READ_BITS {
            return ModbusReply::exception(EXC_ILLEGAL_VALUE);
        }
        let mut out = vec![0u8; count.div_ceil(8) as usize];
        for i in 0..count {
            let Some(address) = start.checked_add(i) else {
                return ModbusReply::exception(EXC_ILLEGAL_ADDRESS);
            };
            if map.get(&address).copied().unwrap_or(false) {
                out[(i / 8) as usize] |= 1 << (i % 8);
            }
        }
        ModbusReply::ok(out)
    }

    fn read_registers(map: &HashMap<u16, u16>, start: u16, count: u16) -> ModbusReply {
        if count == 0 || count > MAX_READ_REGISTERS {
            return ModbusReply::exception(EXC_ILLEGAL_VALUE);
        }
        let mut out = Vec::with_capacity(count as usize * 2);
        for i in 0..count {
            let Some(address) = start.checked_add(i) else {
                return ModbusReply::exception(EXC_ILLEGAL_ADDRESS);
            };
            out.put_u16(map.get(&address).copied().unwrap_or(0));
        }
        ModbusReply::ok(out)
    }

    fn write_echo(register: u16, value: u16) -> ModbusReply {
        let mut out = Vec::with_capacity(4);
        out.put_u16(register);
        out.put_u16(value);
        ModbusReply::ok(out)
    }

    fn handle(bank: &mut Bank, request: &ModbusRequest) -> ModbusReply {
        let (start, count, payload) = (request.register, request.count, &request.payload);
        match request.function {
            0x01 => Self::read_bits(&bank.coils, start, count),
            0x02 => Self::read_bits(&bank.discrete_inputs, start, count),
            0x03 => Self::read_registers(&bank.holding_registers, start, count),
            0x04 => Self::read_registers(&bank.input_registers, start, count),
            0x05 => {
                let Some(value) = be_word(payload, 0) else {
                    return ModbusReply::failure(ModbusStatus::InvalidRequest);
                };
                let on = match value {
                    0xFF00 => true,
                    0x0000 => false,
                    _ => return ModbusReply::exception(EXC_ILLEGAL_VALUE),
                };
                bank.coils.insert(start, on);
                Self::write_echo(start, value)
            },
            0x06 => {
                let Some(value) = be_word(payload, 0) else {
                    return ModbusReply::failure(ModbusStatus::InvalidRequest);
                };
                bank.holding_registers.insert(start, value);
                Self::write_echo(start, value)
            },
            0x0F => {
                if count == 0 || payload.len() < count.div_ceil(8) as usize {
                    return ModbusReply::failure(ModbusStatus::InvalidRequest);
                }
                for i in 0..count {
                    let bit = payload[(i / 8) as usize] & (1 << (i % 8)) != 0;
                    bank.coils.insert(start.wrapping_add(i), bit);
                }
                Self::write_echo(start, count)
            },
            0x10 => {
                if count == 0 || payload.len() < count as usize * 2 {
                    return ModbusReply::failure(ModbusStatus::InvalidRequest);
                }
                for i in 0..count {
                    if let Some(value) = be_word(payload, i as usize * 2) {
                        bank.holding_registers.insert(start.wrapping_add(i), value);
                    }
                }
                Self::write_echo(start, count)
            },
            _ => ModbusReply::exception(EXC_ILLEGAL_FUNCTION),
        }
    }
}

fn be_word(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[async_trait]
impl ModbusExecutor for ModbusSimulator {
    async fn execute(&mut self, request: &ModbusRequest) -> ModbusReply {
        let mut bank = self.bank.lock();
        bank.attempts += 1;

        if let Some(status) = bank.forced_status {
            debug!("Simulator forcing {}", status);
            return ModbusReply::failure(status);
        }
        // broadcast and foreign slaves never answer
        if request.slave != self.slave {
            return ModbusReply::failure(ModbusStatus::Timeout);
        }
        Self::handle(&mut bank, request)
    }

    fn name(&self) -> &str {
        "simulator"
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn req(function: u8, register: u16, count: u16, payload: Vec<u8>) -> ModbusRequest {
        ModbusRequest {
            slave: 1,
            function,
            register,
            count,
            payload,
        }
    }

    #[tokio::test]
    async fn test_read_holding_registers_big_endian() {
        let mut sim = ModbusSimulator::new(1).with_test_data();
        let reply = sim.execute(&req(0x03, 1, 3, vec![])).await;
        assert!(reply.is_ok());
        assert_eq!(reply.data, vec![0, 10, 0, 20, 0, 30]);
    }

    #[tokio::test]
    async fn test_read_coils_packed_lsb_first() {
        let mut sim = ModbusSimulator::new(1).with_test_data();
        // coils 1..=10: even addresses set
        let reply = sim.execute(&req(0x01, 1, 10, vec![])).await;
        assert_eq!(reply.data, vec![0b1010_1010, 0b0000_0010]);
    }

    #[tokio::test]
    async fn test_write_multiple_registers() {
        let mut sim = ModbusSimulator::new(1);
        let reply = sim
            .execute(&req(0x10, 0x20, 2, vec![0x12, 0x34, 0xAB, 0xCD]))
            .await;
        assert_eq!(reply.data, vec![0x00, 0x20, 0x00, 0x02]);
        assert_eq!(sim.holding(0x20), 0x1234);
        assert_eq!(sim.holding(0x21), 0xABCD);
    }

    #[tokio::test]
    async fn test_write_single_coil() {
        let mut sim = ModbusSimulator::new(1);
        let reply = sim.execute(&req(0x05, 7, 1, vec![0xFF, 0x00])).await;
        assert!(reply.is_ok());
        assert!(sim.coil(7));

        let reply = sim.execute(&req(0x05, 7, 1, vec![0x12, 0x34])).await;
        assert_eq!(reply, ModbusReply::exception(EXC_ILLEGAL_VALUE));
    }

    #[tokio::test]
    async fn test_unknown_function_is_exception() {
        let mut sim = ModbusSimulator::new(1);
        let reply = sim.execute(&req(0x2B, 0, 1, vec![])).await;
        assert_eq!(reply.status, ModbusStatus::Exception);
        assert_eq!(reply.data, vec![EXC_ILLEGAL_FUNCTION]);
    }

    #[tokio::test]
    async fn test_foreign_slave_times_out() {
        let mut sim = ModbusSimulator::new(1);
        let mut request = req(0x03, 0, 1, vec![]);
        request.slave = 2;
        assert_eq!(sim.execute(&request).await.status, ModbusStatus::Timeout);
    }

    #[tokio::test]
    async fn test_forced_status_counts_attempts() {
        let mut sim = ModbusSimulator::new(1);
        let handle = sim.clone();
        handle.force_status(Some(ModbusStatus::CrcError));

        for _ in 0..2 {
            let reply = sim.execute(&req(0x03, 0, 1, vec![])).await;
            assert_eq!(reply.status, ModbusStatus::CrcError);
        }
        assert_eq!(handle.attempts(), 2);

        handle.force_status(None);
        assert!(sim.execute(&req(0x03, 0, 1, vec![])).await.is_ok());
    }
}
