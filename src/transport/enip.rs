//! EtherNet/IP explicit-messaging tag writer.

use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::cip::{self, EncapHeader, ENCAP_HEADER_LEN};
use super::{ProtocolError, TagValue, TagWriter};
use crate::config::PlcSettings;

/// Connection parameters for an EtherNet/IP controller.
#[derive(Clone, Debug)]
pub struct EnipSettings {
    pub address: String,
    pub port: u16,
    /// Processor slot on the backplane; ignored when `routed` is false.
    pub slot: u8,
    /// Wrap requests in Unconnected Send (ControlLogix/CompactLogix).
    pub routed: bool,
    pub timeout: Duration,
}

impl From<&PlcSettings> for EnipSettings {
    fn from(plc: &PlcSettings) -> Self {
        Self {
            address: plc.address.clone(),
            port: plc.port,
            slot: plc.slot,
            routed: !plc.micro800,
            timeout: plc.timeout,
        }
    }
}

/// Blocking EtherNet/IP client holding one registered session.
pub struct EnipClient {
    stream: Option<TcpStream>,
    session: u32,
    settings: EnipSettings,
    context_counter: u64,
}

impl EnipClient {
    /// Connect and register a session.
    pub fn connect(settings: EnipSettings) -> Result<Self> {
        let addr = resolve(&settings.address, settings.port)?;
        let stream = TcpStream::connect_timeout(&addr, settings.timeout)
            .with_context(|| format!("connect to EtherNet/IP controller at {}", addr))?;
        stream.set_read_timeout(Some(settings.timeout))?;
        stream.set_write_timeout(Some(settings.timeout))?;
        stream.set_nodelay(true)?;

        let mut client = Self {
            stream: Some(stream),
            session: 0,
            settings,
            context_counter: 0,
        };
        let context = client.next_context();
        let (header, _) = client
            .exchange(&cip::register_session_request(context))
            .context("register EtherNet/IP session")?;
        if header.command != cip::CMD_REGISTER_SESSION {
            return Err(ProtocolError::Malformed(format!(
                "expected RegisterSession reply, got command 0x{:04x}",
                header.command
            ))
            .into());
        }
        client.session = header.session;
        log::info!(
            "EtherNet/IP session 0x{:08x} registered with {}",
            client.session,
            addr
        );
        Ok(client)
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    fn next_context(&mut self) -> [u8; 8] {
        self.context_counter = self.context_counter.wrapping_add(1);
        self.context_counter.to_le_bytes()
    }

    fn exchange(&mut self, request: &[u8]) -> Result<(EncapHeader, Vec<u8>)> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::Closed)?;
        stream.write_all(request).context("send EtherNet/IP request")?;

        let mut header_bytes = [0u8; ENCAP_HEADER_LEN];
        stream
            .read_exact(&mut header_bytes)
            .context("read EtherNet/IP reply header")?;
        let header = EncapHeader::parse(&header_bytes)?;
        let mut payload = vec![0u8; header.length as usize];
        stream
            .read_exact(&mut payload)
            .context("read EtherNet/IP reply payload")?;
        if header.status != 0 {
            return Err(ProtocolError::Encapsulation {
                command: header.command,
                status: header.status,
            }
            .into());
        }
        Ok((header, payload))
    }
}

impl TagWriter for EnipClient {
    fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()> {
        let write = cip::write_tag_request(tag, value)?;
        let cip_request = if self.settings.routed {
            cip::unconnected_send(&write, self.settings.slot)
        } else {
            write
        };
        let context = self.next_context();
        let timeout_secs = self.settings.timeout.as_secs().clamp(1, u16::MAX as u64) as u16;
        let request = cip::send_rr_data_request(self.session, context, timeout_secs, &cip_request);
        let (_, payload) = self
            .exchange(&request)
            .with_context(|| format!("write tag {}", tag))?;
        let reply = cip::unconnected_item(&payload)?;
        cip::check_reply(reply, cip::SERVICE_WRITE_TAG)
            .map_err(|e| anyhow::Error::new(e).context(format!("write tag {} = {}", tag, value)))?;
        log::debug!("wrote {} = {}", tag, value);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let context = self.next_context();
        let request = cip::unregister_session_request(self.session, context);
        // The controller closes the socket without replying.
        if let Err(err) = stream.write_all(&request) {
            log::warn!("failed to unregister EtherNet/IP session: {}", err);
        }
        let _ = stream.shutdown(Shutdown::Both);
        log::info!("EtherNet/IP session 0x{:08x} closed", self.session);
        Ok(())
    }
}

impl Drop for EnipClient {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("EtherNet/IP close failed: {}", err);
        }
    }
}

pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolve {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("no address found for {}:{}", host, port))
}
