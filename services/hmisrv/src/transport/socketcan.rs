//! SocketCAN link driver (Linux)
//!
//! Two raw sockets on the same interface: one transmits (with local loopback
//! disabled so our own frames are not received back), one is drained by a
//! blocking reader thread that plays the role of the receive interrupt.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ::socketcan::{
    CanFrame as SocketFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, SocketOptions,
};
use tracing::{debug, error, info, warn};

use super::link::CanLink;
use crate::error::{HmiSrvError, Result};
use crate::protocol::{CanFrame, HexId};
use crate::router::InboundRouter;

pub struct SocketCanLink {
    interface: String,
    tx: CanSocket,
    router: Arc<InboundRouter>,
}

impl SocketCanLink {
    pub fn open(interface: &str, router: Arc<InboundRouter>) -> Result<Self> {
        debug!("Opening CAN interface: {}", interface);
        let tx = CanSocket::open(interface)
            .map_err(|e| HmiSrvError::link(format!("open {}: {}", interface, e)))?;
        tx.set_loopback(false)
            .map_err(|e| HmiSrvError::link(format!("loopback off {}: {}", interface, e)))?;

        Ok(Self {
            interface: interface.to_string(),
            tx,
            router,
        })
    }

    /// Start the receive thread feeding the router
    pub fn spawn_reader(&self) -> Result<JoinHandle<()>> {
        let rx = CanSocket::open(&self.interface)
            .map_err(|e| HmiSrvError::link(format!("open {}: {}", self.interface, e)))?;
        let router = Arc::clone(&self.router);
        let interface = self.interface.clone();

        std::thread::Builder::new()
            .name(format!("can-rx-{}", interface))
            .spawn(move || {
                info!("CAN receive thread started on {}", interface);
                loop {
                    match rx.read_frame() {
                        Ok(frame) => {
                            if let Some(frame) = from_socket_frame(&frame) {
                                router.on_frame_received(&frame);
                            }
                        },
                        Err(e) => {
                            error!("CAN receive error on {}: {}", interface, e);
                            std::thread::sleep(Duration::from_millis(100));
                        },
                    }
                }
            })
            .map_err(|e| HmiSrvError::internal(format!("spawn reader: {}", e)))
    }
}

impl CanLink for SocketCanLink {
    fn transmit(&self, frame: &CanFrame) -> Result<()> {
        let id = ExtendedId::new(frame.id)
            .ok_or_else(|| HmiSrvError::protocol(format!("id {} exceeds 29 bits", HexId(frame.id))))?;
        let out = if frame.remote {
            SocketFrame::new_remote(id, 0)
        } else {
            SocketFrame::new(id, frame.payload())
        }
        .ok_or_else(|| HmiSrvError::protocol("invalid frame".to_string()))?;

        self.tx
            .write_frame(&out)
            .map_err(|e| HmiSrvError::link(format!("write {}: {}", self.interface, e)))?;

        // the kernel accepted the frame; treat that as hardware completion
        self.router.on_transmit_complete();
        Ok(())
    }
}

fn from_socket_frame(frame: &SocketFrame) -> Option<CanFrame> {
    if let SocketFrame::Error(_) = frame {
        warn!("CAN error frame received");
        return None;
    }
    if !frame.is_extended() {
        return None;
    }

    let id = frame.raw_id();
    if frame.is_remote_frame() {
        Some(CanFrame::remote(id))
    } else {
        Some(CanFrame::new(id, frame.data()))
    }
}
