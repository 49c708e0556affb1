//! Engine assembly
//!
//! Builds the queues, router, link and both tasks, then hands back an
//! [`Engine`] handle. Wiring:
//!
//! ```text
//! link rx ──> InboundRouter ──┬─ Trigger ───> OutboundDispatcher ──> TxFlowControl ──> link tx
//!                             └─ Command ───> CommandProcessor ──┘ (answers, state reports)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::{CommandProcessor, DeviceControl, ProcessorStats, SnapshotControl};
use crate::config::{HmiSrvConfig, LinkKind};
use crate::dispatcher::OutboundDispatcher;
use crate::error::Result;
use crate::logbook::{DailyLogbook, LogSink};
use crate::modbus::{ModbusExecutor, ModbusSimulator, RtuExecutor};
use crate::protocol::constants::{COMMAND_QUEUE_CAPACITY, TRIGGER_QUEUE_CAPACITY};
use crate::queue::bounded;
use crate::router::InboundRouter;
use crate::settings::{ConfigAssembler, ConfigStore, FileConfigStore};
use crate::telemetry::{SharedSnapshot, StationSnapshot, TelemetryCatalog, TelemetryPublisher};
use crate::transport::{CanLink, SimulatedLink, TxCompletion, TxFlowControl, TxStats};

/// Everything the engine needs besides the link
pub struct EngineParts {
    pub catalog: TelemetryCatalog,
    pub snapshot: SharedSnapshot,
    pub store: Arc<dyn ConfigStore>,
    pub log: Arc<dyn LogSink>,
    pub control: Arc<dyn DeviceControl>,
    pub executor: Box<dyn ModbusExecutor>,
    /// Period of the telemetry cycle, `None` disables it
    pub telemetry_period: Option<Duration>,
}

impl EngineParts {
    /// Standard catalog and snapshot control around the given collaborators
    pub fn new(
        store: Arc<dyn ConfigStore>,
        log: Arc<dyn LogSink>,
        executor: Box<dyn ModbusExecutor>,
    ) -> Self {
        let snapshot = StationSnapshot::default().shared();
        Self {
            catalog: TelemetryCatalog::standard(),
            control: Arc::new(SnapshotControl::new(Arc::clone(&snapshot))),
            snapshot,
            store,
            log,
            executor,
            telemetry_period: None,
        }
    }

    /// Durable store, daily logbook and executor taken from configuration
    pub fn from_config(config: &HmiSrvConfig) -> Result<Self> {
        let store = FileConfigStore::load(&config.storage.config_file)?;
        let logbook = DailyLogbook::open(&config.storage.logbook_dir)?;
        info!("Command logbook: {:?}", logbook.current_path());

        let executor: Box<dyn ModbusExecutor> = match &config.modbus.serial {
            Some(serial) => Box::new(RtuExecutor::open(serial)?),
            None => {
                info!(
                    "No serial port configured, MODBUS simulator answers slave {}",
                    config.modbus.simulator_slave
                );
                Box::new(ModbusSimulator::new(config.modbus.simulator_slave).with_test_data())
            },
        };

        let mut parts = Self::new(Arc::new(store), Arc::new(logbook), executor);
        if config.telemetry.interval_ms > 0 {
            parts.telemetry_period = Some(Duration::from_millis(config.telemetry.interval_ms));
        }
        Ok(parts)
    }
}

/// Running engine
pub struct Engine {
    router: Arc<InboundRouter>,
    publisher: TelemetryPublisher,
    snapshot: SharedSnapshot,
    tx_stats: Arc<TxStats>,
    processor_stats: Arc<ProcessorStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the engine tasks. `make_link` receives the router so the
    /// driver can deliver received frames and transmit completions.
    pub fn start<F>(parts: EngineParts, make_link: F) -> Result<Self>
    where
        F: FnOnce(Arc<InboundRouter>) -> Result<Arc<dyn CanLink>>,
    {
        let (trigger_tx, trigger_rx) = bounded("triggers", TRIGGER_QUEUE_CAPACITY);
        let (command_tx, command_rx) = bounded("commands", COMMAND_QUEUE_CAPACITY);
        let completion = TxCompletion::new();

        let router = Arc::new(InboundRouter::new(
            trigger_tx.clone(),
            command_tx,
            completion.clone(),
        ));
        let link = make_link(Arc::clone(&router))?;
        let flow = TxFlowControl::new(link, &completion);
        let tx_stats = flow.stats();

        let devices = parts.catalog.devices();
        let dispatcher = OutboundDispatcher::new(
            trigger_rx,
            flow,
            parts.catalog,
            Arc::clone(&parts.snapshot),
            Arc::clone(&parts.store),
        );
        let assembler = ConfigAssembler::new(parts.store, Arc::clone(&parts.log));
        let processor = CommandProcessor::new(
            command_rx,
            trigger_tx.clone(),
            parts.control,
            parts.executor,
            assembler,
            parts.log,
        );
        let processor_stats = processor.stats();

        let mut tasks = vec![
            tokio::spawn(dispatcher.run()),
            tokio::spawn(processor.run()),
        ];

        let publisher = TelemetryPublisher::new(trigger_tx);
        if let Some(period) = parts.telemetry_period {
            tasks.push(publisher.spawn_periodic(devices, period));
        }

        info!("Engine started with {} tasks", tasks.len());
        Ok(Self {
            router,
            publisher,
            snapshot: parts.snapshot,
            tx_stats,
            processor_stats,
            tasks,
        })
    }

    /// Start with the link driver selected in configuration
    pub fn from_config(config: &HmiSrvConfig) -> Result<Self> {
        let parts = EngineParts::from_config(config)?;
        match config.can.link {
            LinkKind::Simulated => Self::start(parts, |router| {
                Ok(Arc::new(SimulatedLink::new(router.completion())) as Arc<dyn CanLink>)
            }),
            LinkKind::Socketcan => Self::start_socketcan(parts, &config.can.interface),
        }
    }

    #[cfg(all(target_os = "linux", feature = "can-linux"))]
    fn start_socketcan(parts: EngineParts, interface: &str) -> Result<Self> {
        use crate::transport::socketcan::SocketCanLink;

        Self::start(parts, |router| {
            let link = SocketCanLink::open(interface, router)?;
            // the reader thread lives as long as the process
            let _reader = link.spawn_reader()?;
            Ok(Arc::new(link) as Arc<dyn CanLink>)
        })
    }

    #[cfg(not(all(target_os = "linux", feature = "can-linux")))]
    fn start_socketcan(_parts: EngineParts, interface: &str) -> Result<Self> {
        Err(crate::error::HmiSrvError::config(format!(
            "socketcan link on {} requires the can-linux feature on Linux",
            interface
        )))
    }

    /// Receive side of the link driver
    pub fn router(&self) -> &Arc<InboundRouter> {
        &self.router
    }

    /// Handle for device drivers pushing pull-requests
    pub fn publisher(&self) -> &TelemetryPublisher {
        &self.publisher
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    pub fn tx_stats(&self) -> &Arc<TxStats> {
        &self.tx_stats
    }

    pub fn processor_stats(&self) -> &Arc<ProcessorStats> {
        &self.processor_stats
    }

    /// Stop all tasks and report queue losses
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Engine task ended abnormally: {}", e);
                }
            }
        }

        let (triggers, commands) = self.router.dropped();
        info!(
            "Engine stopped: {} frames sent, {} transmit errors, {} triggers and {} commands dropped",
            self.tx_stats.sent(),
            self.tx_stats.errors(),
            triggers,
            commands
        );
    }
}
