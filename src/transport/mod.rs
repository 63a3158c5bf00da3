//! Outbound links to controllers and robots.
//!
//! Each pipeline talks to exactly one external peer through one of the
//! traits below. Real clients speak EtherNet/IP, Modbus TCP or UDP; tests
//! substitute recording fakes.

mod cip;
pub mod enip;
pub mod modbus;
mod pulse;
pub mod udp;

use anyhow::Result;
use thiserror::Error;

pub use enip::{EnipClient, EnipSettings};
pub use modbus::ModbusTcpClient;
pub use pulse::FlagPulse;
pub use udp::{DetectionEvent, UdpBroadcaster};

/// Typed value written to a controller tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Dint(i32),
    Real(f32),
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{}", v),
            TagValue::Dint(v) => write!(f, "{}", v),
            TagValue::Real(v) => write!(f, "{}", v),
        }
    }
}

/// Writes named tags on an industrial controller.
pub trait TagWriter {
    fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()>;

    /// Release the connection. Further writes are errors.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes single-bit coils on a Modbus device.
pub trait CoilWriter {
    fn write_coil(&mut self, address: u16, state: bool) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fire-and-forget datagram destination.
pub trait DatagramSink {
    fn send(&mut self, payload: &[u8]) -> Result<()>;
}

impl<T: TagWriter + ?Sized> TagWriter for Box<T> {
    fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()> {
        (**self).write_tag(tag, value)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: CoilWriter + ?Sized> CoilWriter for Box<T> {
    fn write_coil(&mut self, address: u16, state: bool) -> Result<()> {
        (**self).write_coil(address, state)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: DatagramSink + ?Sized> DatagramSink for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        (**self).send(payload)
    }
}

/// Wire-level failures reported by a peer or detected while decoding its reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("encapsulation command 0x{command:04x} failed with status 0x{status:08x}")]
    Encapsulation { command: u16, status: u32 },
    #[error("CIP service 0x{service:02x} failed with general status 0x{status:02x}")]
    Cip { service: u8, status: u8 },
    #[error("modbus function 0x{function:02x} returned exception 0x{code:02x}")]
    ModbusException { function: u8, code: u8 },
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("connection is closed")]
    Closed,
}
