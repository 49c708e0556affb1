//! Common test utilities: capturing link, recording log sink, engine harness

#![allow(dead_code, clippy::disallowed_methods)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use hmisrv::error::Result;
use hmisrv::logbook::LogSink;
use hmisrv::modbus::ModbusSimulator;
use hmisrv::protocol::{decode, encode, CanFrame, CommandMessage};
use hmisrv::router::InboundRouter;
use hmisrv::settings::{ConfigStore, ConfigValue, FileConfigStore, ParamSpec};
use hmisrv::transport::CanLink;
use hmisrv::{Engine, EngineParts};

/// Link that records every transmitted frame and completes it at once
pub struct CaptureLink {
    router: Arc<InboundRouter>,
    frames: Mutex<Vec<CanFrame>>,
}

impl CaptureLink {
    pub fn new(router: Arc<InboundRouter>) -> Self {
        Self {
            router,
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn frames(&self) -> Vec<CanFrame> {
        self.frames.lock().clone()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl CanLink for CaptureLink {
    fn transmit(&self, frame: &CanFrame) -> Result<()> {
        self.frames.lock().push(*frame);
        self.router.on_transmit_complete();
        Ok(())
    }
}

/// Log sink keeping one line per record
#[derive(Default)]
pub struct Records {
    lines: Mutex<Vec<String>>,
}

impl Records {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl LogSink for Records {
    fn command(&self, message: &CommandMessage) {
        self.lines.lock().push(format!(
            "cmd {:02x}/{:02x}/{:02x}",
            message.device, message.parameter, message.subpacket
        ));
    }

    fn config_change(&self, param: &ParamSpec, _previous: Option<&ConfigValue>, current: &ConfigValue) {
        self.lines.lock().push(format!("cfg {}={}", param.name, current));
    }

    fn config_error(&self, parameter: u8, reason: &str) {
        self.lines
            .lock()
            .push(format!("err {} {}", parameter, reason));
    }
}

pub struct Harness {
    pub engine: Engine,
    pub link: Arc<CaptureLink>,
    pub store: Arc<FileConfigStore>,
    pub records: Arc<Records>,
    pub simulator: ModbusSimulator,
    pub dir: TempDir,
}

impl Harness {
    /// Engine over a capturing link, file store in a temp dir and simulator slave 1
    pub fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileConfigStore::load(dir.path().join("parameters.json")).unwrap());
        let records = Arc::new(Records::default());
        let simulator = ModbusSimulator::new(1).with_test_data();

        let parts = EngineParts::new(
            Arc::clone(&store) as Arc<dyn ConfigStore>,
            Arc::clone(&records) as Arc<dyn LogSink>,
            Box::new(simulator.clone()),
        );

        let captured: Arc<Mutex<Option<Arc<CaptureLink>>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        let engine = Engine::start(parts, move |router| {
            let link = Arc::new(CaptureLink::new(router));
            *slot.lock() = Some(Arc::clone(&link));
            Ok(link as Arc<dyn CanLink>)
        })
        .unwrap();
        let link = captured.lock().take().unwrap();

        Self {
            engine,
            link,
            store,
            records,
            simulator,
            dir,
        }
    }

    /// Deliver a data frame as the link receive path would
    pub fn receive(&self, device: u8, parameter: u8, subpacket: u8, data: &[u8]) {
        let frame = CanFrame::new(encode(device, parameter, subpacket), data);
        self.engine.router().on_frame_received(&frame);
    }

    pub fn receive_remote(&self, device: u8, parameter: u8, subpacket: u8) {
        let frame = CanFrame::remote(encode(device, parameter, subpacket));
        self.engine.router().on_frame_received(&frame);
    }

    /// Wait until at least `count` frames were transmitted
    pub async fn wait_frames(&self, count: usize) -> Vec<CanFrame> {
        wait_until(|| self.link.frames().len() >= count).await;
        self.link.frames()
    }

    /// Wait until the processor has consumed `count` commands
    pub async fn wait_processed(&self, count: u64) {
        let stats = Arc::clone(self.engine.processor_stats());
        wait_until(move || stats.processed.load(std::sync::atomic::Ordering::Relaxed) >= count)
            .await;
    }
}

/// Poll `condition` every millisecond, fail after two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// `(device, parameter, subpacket, length)` of each frame
pub fn layout(frames: &[CanFrame]) -> Vec<(u8, u8, u8, u8)> {
    frames
        .iter()
        .map(|f| {
            let (d, p, s) = decode(f.id);
            (d, p, s, f.len)
        })
        .collect()
}
