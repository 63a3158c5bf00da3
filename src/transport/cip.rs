//! EtherNet/IP encapsulation and CIP message encoding.
//!
//! Only what a tag writer needs: session registration, unconnected
//! request/reply (SendRRData), the Write Tag service, and the Unconnected
//! Send wrapper used to route through a ControlLogix backplane.

use super::{ProtocolError, TagValue};

pub(crate) const CMD_REGISTER_SESSION: u16 = 0x0065;
pub(crate) const CMD_UNREGISTER_SESSION: u16 = 0x0066;
pub(crate) const CMD_SEND_RR_DATA: u16 = 0x006F;

pub(crate) const ENCAP_HEADER_LEN: usize = 24;

const ITEM_NULL_ADDRESS: u16 = 0x0000;
const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;

pub(crate) const SERVICE_WRITE_TAG: u8 = 0x4D;
pub(crate) const SERVICE_UNCONNECTED_SEND: u8 = 0x52;
const REPLY_FLAG: u8 = 0x80;

const TYPE_BOOL: u16 = 0x00C1;
const TYPE_DINT: u16 = 0x00C4;
const TYPE_REAL: u16 = 0x00CA;

/// Priority/time-tick byte and timeout ticks for Unconnected Send
/// (2^10 ms * 0x0E ticks ~ 14 s at the connection manager).
const UCMM_PRIORITY_TICK: u8 = 0x0A;
const UCMM_TIMEOUT_TICKS: u8 = 0x0E;

/// Fixed-size encapsulation header, little-endian on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EncapHeader {
    pub command: u16,
    pub length: u16,
    pub session: u32,
    pub status: u32,
    pub context: [u8; 8],
}

impl EncapHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < ENCAP_HEADER_LEN {
            return Err(ProtocolError::Malformed(format!(
                "encapsulation header needs {} bytes, got {}",
                ENCAP_HEADER_LEN,
                bytes.len()
            )));
        }
        let mut context = [0u8; 8];
        context.copy_from_slice(&bytes[12..20]);
        Ok(Self {
            command: u16::from_le_bytes([bytes[0], bytes[1]]),
            length: u16::from_le_bytes([bytes[2], bytes[3]]),
            session: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            status: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            context,
        })
    }
}

/// Frame a command with its payload.
pub(crate) fn encapsulate(command: u16, session: u32, context: [u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENCAP_HEADER_LEN + payload.len());
    out.extend_from_slice(&command.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&session.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&context);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub(crate) fn register_session_request(context: [u8; 8]) -> Vec<u8> {
    // Protocol version 1, no options.
    encapsulate(CMD_REGISTER_SESSION, 0, context, &[0x01, 0x00, 0x00, 0x00])
}

pub(crate) fn unregister_session_request(session: u32, context: [u8; 8]) -> Vec<u8> {
    encapsulate(CMD_UNREGISTER_SESSION, session, context, &[])
}

/// Wrap a CIP request in a SendRRData common packet.
pub(crate) fn send_rr_data_request(
    session: u32,
    context: [u8; 8],
    timeout_secs: u16,
    cip: &[u8],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16 + cip.len());
    payload.extend_from_slice(&0u32.to_le_bytes()); // interface handle
    payload.extend_from_slice(&timeout_secs.to_le_bytes());
    payload.extend_from_slice(&2u16.to_le_bytes()); // item count
    payload.extend_from_slice(&ITEM_NULL_ADDRESS.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&ITEM_UNCONNECTED_DATA.to_le_bytes());
    payload.extend_from_slice(&(cip.len() as u16).to_le_bytes());
    payload.extend_from_slice(cip);
    encapsulate(CMD_SEND_RR_DATA, session, context, &payload)
}

/// ANSI extended symbolic path; dotted names become one segment per member.
pub(crate) fn symbolic_path(tag: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut path = Vec::new();
    for member in tag.split('.') {
        let bytes = member.as_bytes();
        if bytes.is_empty() || bytes.len() > u8::MAX as usize {
            return Err(ProtocolError::Malformed(format!("invalid tag name '{}'", tag)));
        }
        path.push(0x91);
        path.push(bytes.len() as u8);
        path.extend_from_slice(bytes);
        if bytes.len() % 2 == 1 {
            path.push(0x00);
        }
    }
    Ok(path)
}

/// CIP Write Tag request for a single element.
pub(crate) fn write_tag_request(tag: &str, value: TagValue) -> Result<Vec<u8>, ProtocolError> {
    let path = symbolic_path(tag)?;
    let mut req = Vec::with_capacity(8 + path.len());
    req.push(SERVICE_WRITE_TAG);
    req.push((path.len() / 2) as u8);
    req.extend_from_slice(&path);
    match value {
        TagValue::Bool(v) => {
            req.extend_from_slice(&TYPE_BOOL.to_le_bytes());
            req.extend_from_slice(&1u16.to_le_bytes());
            req.push(if v { 0xFF } else { 0x00 });
        }
        TagValue::Dint(v) => {
            req.extend_from_slice(&TYPE_DINT.to_le_bytes());
            req.extend_from_slice(&1u16.to_le_bytes());
            req.extend_from_slice(&v.to_le_bytes());
        }
        TagValue::Real(v) => {
            req.extend_from_slice(&TYPE_REAL.to_le_bytes());
            req.extend_from_slice(&1u16.to_le_bytes());
            req.extend_from_slice(&v.to_le_bytes());
        }
    }
    Ok(req)
}

/// Route an embedded request to the processor in `slot` on backplane port 1.
pub(crate) fn unconnected_send(embedded: &[u8], slot: u8) -> Vec<u8> {
    let mut req = Vec::with_capacity(16 + embedded.len());
    req.push(SERVICE_UNCONNECTED_SEND);
    req.push(0x02); // path size in words
    req.extend_from_slice(&[0x20, 0x06, 0x24, 0x01]); // connection manager, instance 1
    req.push(UCMM_PRIORITY_TICK);
    req.push(UCMM_TIMEOUT_TICKS);
    req.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
    req.extend_from_slice(embedded);
    if embedded.len() % 2 == 1 {
        req.push(0x00);
    }
    req.push(0x01); // route path size in words
    req.push(0x00); // reserved
    req.extend_from_slice(&[0x01, slot]); // port 1 (backplane), link = slot
    req
}

/// Pull the unconnected data item out of a SendRRData reply payload.
pub(crate) fn unconnected_item(payload: &[u8]) -> Result<&[u8], ProtocolError> {
    if payload.len() < 8 {
        return Err(ProtocolError::Malformed("SendRRData reply too short".into()));
    }
    let count = u16::from_le_bytes([payload[6], payload[7]]) as usize;
    let mut offset = 8;
    for _ in 0..count {
        if payload.len() < offset + 4 {
            return Err(ProtocolError::Malformed("truncated CPF item header".into()));
        }
        let kind = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
        let len = u16::from_le_bytes([payload[offset + 2], payload[offset + 3]]) as usize;
        offset += 4;
        if payload.len() < offset + len {
            return Err(ProtocolError::Malformed("truncated CPF item data".into()));
        }
        if kind == ITEM_UNCONNECTED_DATA {
            return Ok(&payload[offset..offset + len]);
        }
        offset += len;
    }
    Err(ProtocolError::Malformed("reply has no unconnected data item".into()))
}

/// Check a CIP reply for the expected service and a success status.
///
/// A failed Unconnected Send may come back as the 0xD2 reply instead of the
/// embedded service's reply; either way a non-zero general status is an error.
pub(crate) fn check_reply(reply: &[u8], expected_service: u8) -> Result<(), ProtocolError> {
    if reply.len() < 4 {
        return Err(ProtocolError::Malformed("CIP reply too short".into()));
    }
    let service = reply[0];
    let status = reply[2];
    let accepted = [
        expected_service | REPLY_FLAG,
        SERVICE_UNCONNECTED_SEND | REPLY_FLAG,
    ];
    if !accepted.contains(&service) {
        return Err(ProtocolError::Malformed(format!(
            "unexpected reply service 0x{:02x}",
            service
        )));
    }
    if status != 0 {
        return Err(ProtocolError::Cip {
            service: service & !REPLY_FLAG,
            status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_session_layout() {
        let req = register_session_request([7; 8]);
        assert_eq!(req.len(), 28);
        let header = EncapHeader::parse(&req).unwrap();
        assert_eq!(header.command, CMD_REGISTER_SESSION);
        assert_eq!(header.length, 4);
        assert_eq!(header.session, 0);
        assert_eq!(header.context, [7; 8]);
        assert_eq!(&req[24..], &[1, 0, 0, 0]);
    }

    #[test]
    fn symbolic_path_pads_odd_names() {
        assert_eq!(symbolic_path("Abc").unwrap(), vec![0x91, 3, b'A', b'b', b'c', 0]);
        assert_eq!(
            symbolic_path("Ab.Cd").unwrap(),
            vec![0x91, 2, b'A', b'b', 0x91, 2, b'C', b'd']
        );
        assert!(symbolic_path("a..b").is_err());
    }

    #[test]
    fn write_dint_request() {
        let req = write_tag_request("Idx", TagValue::Dint(3)).unwrap();
        assert_eq!(
            req,
            vec![0x4D, 3, 0x91, 3, b'I', b'd', b'x', 0, 0xC4, 0, 1, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn write_real_and_bool_requests() {
        let req = write_tag_request("P", TagValue::Real(30.0)).unwrap();
        assert_eq!(&req[6..10], &[0xCA, 0, 1, 0]);
        assert_eq!(&req[10..], &30.0f32.to_le_bytes());

        let req = write_tag_request("F", TagValue::Bool(true)).unwrap();
        assert_eq!(&req[6..], &[0xC1, 0, 1, 0, 0xFF]);
    }

    #[test]
    fn unconnected_send_routes_to_slot() {
        let embedded = vec![0x4D, 1, 0x91, 0]; // even length, no pad
        let req = unconnected_send(&embedded, 2);
        assert_eq!(req[0], SERVICE_UNCONNECTED_SEND);
        assert_eq!(&req[2..6], &[0x20, 0x06, 0x24, 0x01]);
        assert_eq!(u16::from_le_bytes([req[8], req[9]]), 4);
        assert_eq!(&req[10..14], embedded.as_slice());
        assert_eq!(&req[14..], &[0x01, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn finds_unconnected_item_and_checks_status() {
        let reply = [0xCD, 0x00, 0x00, 0x00];
        let request = send_rr_data_request(1, [0; 8], 10, &reply);
        let item = unconnected_item(&request[ENCAP_HEADER_LEN..]).unwrap();
        assert_eq!(item, &reply);
        assert!(check_reply(item, SERVICE_WRITE_TAG).is_ok());

        let failed = [0xCD, 0x00, 0x05, 0x00];
        assert_eq!(
            check_reply(&failed, SERVICE_WRITE_TAG),
            Err(ProtocolError::Cip {
                service: SERVICE_WRITE_TAG,
                status: 0x05
            })
        );
    }
}
