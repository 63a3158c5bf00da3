//! JSON-over-UDP detection events.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, UdpSocket};

use super::DatagramSink;
use crate::detect::Detection;

/// One detection as sent to the robot controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub object: String,
    pub confidence: f32,
    pub cx: i32,
    pub cy: i32,
}

impl DetectionEvent {
    pub fn from_detection(det: &Detection) -> Self {
        let (cx, cy) = det.bbox.center();
        Self {
            object: det.label.clone(),
            confidence: det.confidence,
            cx,
            cy,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serialize detection event")
    }
}

/// Sends every datagram to one fixed target from an ephemeral local port.
pub struct UdpBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpBroadcaster {
    pub fn new(target: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).context("bind udp socket")?;
        if let Ok(local) = socket.local_addr() {
            log::debug!("udp sender bound to {}, target {}", local, target);
        }
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DatagramSink for UdpBroadcaster {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, self.target)
            .with_context(|| format!("send datagram to {}", self.target))?;
        Ok(())
    }
}
