//! Modbus TCP coil writer (function 0x05, Write Single Coil).

use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use super::enip::resolve;
use super::{CoilWriter, ProtocolError};
use crate::config::ModbusSettings;

const FUNCTION_WRITE_SINGLE_COIL: u8 = 0x05;
const EXCEPTION_FLAG: u8 = 0x80;
const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;
const MBAP_LEN: usize = 7;
/// Unit id plus the largest Modbus PDU.
const MAX_MBAP_LENGTH: usize = 254;

/// Encode a Write Single Coil request frame (MBAP header + PDU).
pub fn encode_write_single_coil(transaction: u16, unit_id: u8, address: u16, state: bool) -> [u8; 12] {
    let value = if state { COIL_ON } else { COIL_OFF };
    let mut frame = [0u8; 12];
    frame[0..2].copy_from_slice(&transaction.to_be_bytes());
    frame[2..4].copy_from_slice(&0u16.to_be_bytes()); // protocol id
    frame[4..6].copy_from_slice(&6u16.to_be_bytes()); // unit id + 5 byte PDU
    frame[6] = unit_id;
    frame[7] = FUNCTION_WRITE_SINGLE_COIL;
    frame[8..10].copy_from_slice(&address.to_be_bytes());
    frame[10..12].copy_from_slice(&value.to_be_bytes());
    frame
}

/// Validate the reply PDU for a Write Single Coil request.
///
/// A normal reply echoes the request; an exception reply carries the
/// function code with the high bit set and one exception code byte.
pub fn check_write_coil_reply(pdu: &[u8], address: u16, state: bool) -> Result<(), ProtocolError> {
    let Some(&function) = pdu.first() else {
        return Err(ProtocolError::Malformed("empty modbus reply".into()));
    };
    if function == FUNCTION_WRITE_SINGLE_COIL | EXCEPTION_FLAG {
        let code = pdu.get(1).copied().unwrap_or(0);
        return Err(ProtocolError::ModbusException {
            function: FUNCTION_WRITE_SINGLE_COIL,
            code,
        });
    }
    if function != FUNCTION_WRITE_SINGLE_COIL || pdu.len() != 5 {
        return Err(ProtocolError::Malformed(format!(
            "unexpected modbus reply {:02x?}",
            pdu
        )));
    }
    let echoed_addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let echoed_value = u16::from_be_bytes([pdu[3], pdu[4]]);
    let expected_value = if state { COIL_ON } else { COIL_OFF };
    if echoed_addr != address || echoed_value != expected_value {
        return Err(ProtocolError::Malformed(format!(
            "reply echoed coil {} = 0x{:04x}",
            echoed_addr, echoed_value
        )));
    }
    Ok(())
}

/// Stale replies skipped before a reply is treated as lost.
const MAX_STALE_REPLIES: usize = 8;

/// Blocking Modbus TCP client.
///
/// A reply that arrives after its request timed out is skipped by
/// transaction id on the next read. Connection-level failures drop the
/// socket; the next write dials the device again.
pub struct ModbusTcpClient {
    stream: Option<TcpStream>,
    addr: SocketAddr,
    timeout: Duration,
    unit_id: u8,
    transaction: u16,
    closed: bool,
}

impl ModbusTcpClient {
    pub fn connect(settings: &ModbusSettings) -> Result<Self> {
        let addr = resolve(&settings.address, settings.port)?;
        let stream = dial(addr, settings.timeout)?;
        log::info!("Connected to PLC at {}", addr);
        Ok(Self {
            stream: Some(stream),
            addr,
            timeout: settings.timeout,
            unit_id: settings.unit_id,
            transaction: 0,
            closed: false,
        })
    }

    /// Connect when Modbus is enabled. A failed connect is logged and yields
    /// `None`, so presence keeps being tracked without a controller.
    pub fn connect_if_enabled(settings: &ModbusSettings) -> Option<Self> {
        if !settings.enabled {
            log::info!("Modbus sending disabled; presence is only logged.");
            return None;
        }
        match Self::connect(settings) {
            Ok(client) => Some(client),
            Err(err) => {
                log::warn!("PLC connection error: {:#}", err);
                None
            }
        }
    }

    fn link(&mut self) -> Result<&mut TcpStream> {
        if self.closed {
            return Err(ProtocolError::Closed.into());
        }
        if self.stream.is_none() {
            let stream = dial(self.addr, self.timeout)?;
            log::info!("Reconnected to PLC at {}", self.addr);
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or_else(|| ProtocolError::Closed.into())
    }

    fn exchange(&mut self, request: &[u8], transaction: u16) -> Result<Vec<u8>, ExchangeError> {
        let stream = self.link().map_err(ExchangeError::Link)?;
        stream
            .write_all(request)
            .context("send modbus write coil")
            .map_err(ExchangeError::Link)?;
        read_reply(stream, transaction)
    }
}

/// Why an exchange failed, and whether the socket is still usable.
enum ExchangeError {
    /// No reply within the timeout; a late reply may still arrive.
    TimedOut(anyhow::Error),
    /// The byte stream can no longer be trusted.
    Link(anyhow::Error),
}

fn dial(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .with_context(|| format!("Unable to connect to PLC at {}", addr))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn read_exact_or_classify(stream: &mut TcpStream, buf: &mut [u8], what: &str) -> Result<(), ExchangeError> {
    stream.read_exact(buf).map_err(|err| {
        let timed_out = is_timeout(&err);
        let err = anyhow::Error::new(err).context(format!("read modbus reply {}", what));
        if timed_out {
            ExchangeError::TimedOut(err)
        } else {
            ExchangeError::Link(err)
        }
    })
}

/// Read the reply for `transaction`, skipping replies to earlier requests.
fn read_reply(stream: &mut TcpStream, transaction: u16) -> Result<Vec<u8>, ExchangeError> {
    for _ in 0..=MAX_STALE_REPLIES {
        let mut header = [0u8; MBAP_LEN];
        read_exact_or_classify(stream, &mut header, "header")?;
        let reply_tx = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(ExchangeError::Link(
                ProtocolError::Malformed(format!("MBAP length {}", length)).into(),
            ));
        }
        // Length counts the unit id already read in the header.
        let mut pdu = vec![0u8; length - 1];
        read_exact_or_classify(stream, &mut pdu, "body")?;
        if reply_tx == transaction {
            return Ok(pdu);
        }
        log::debug!(
            "skipping stale modbus reply {} while waiting for {}",
            reply_tx,
            transaction
        );
    }
    Err(ExchangeError::Link(
        ProtocolError::Malformed(format!("no reply matched transaction {}", transaction)).into(),
    ))
}

impl CoilWriter for ModbusTcpClient {
    fn write_coil(&mut self, address: u16, state: bool) -> Result<()> {
        self.transaction = self.transaction.wrapping_add(1);
        let transaction = self.transaction;
        let request = encode_write_single_coil(transaction, self.unit_id, address, state);
        let pdu = match self.exchange(&request, transaction) {
            Ok(pdu) => pdu,
            Err(ExchangeError::TimedOut(err)) => return Err(err),
            Err(ExchangeError::Link(err)) => {
                if let Some(stream) = self.stream.take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                return Err(err);
            }
        };
        check_write_coil_reply(&pdu, address, state)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}

impl Drop for ModbusTcpClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
