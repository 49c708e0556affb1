//! MODBUS-over-CAN tunnel and field-bus executors

pub mod executor;
pub mod rtu;
pub mod simulator;
pub mod tunnel;

pub use executor::{execute_with_retry, ModbusExecutor, ModbusReply, ModbusRequest, ModbusStatus};
pub use rtu::RtuExecutor;
pub use simulator::ModbusSimulator;
pub use tunnel::{AnswerEcho, TunnelAnswer, TunnelPhase, TunnelProgress, TunnelState};
