//! Strongly-typed link message.

use zerocopy::IntoBytes;

use crate::netlink::parse::{
    FromNetlink, PResult, cut, parse_attrs, parse_header, parse_string_from_bytes,
};
use crate::netlink::types::{IfInfoMsg, iff, ifla};
use crate::util::MacAddr;

/// A parsed RTM_NEWLINK message.
#[derive(Debug, Clone, Default)]
pub struct LinkMessage {
    pub(crate) header: IfInfoMsg,
    pub(crate) name: Option<String>,
    pub(crate) address: Option<Vec<u8>>,
}

impl LinkMessage {
    /// Interface index.
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    /// Interface name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Administratively up (IFF_UP).
    pub fn is_up(&self) -> bool {
        self.header.ifi_flags & iff::UP != 0
    }

    /// Loopback device (IFF_LOOPBACK).
    pub fn is_loopback(&self) -> bool {
        self.header.ifi_flags & iff::LOOPBACK != 0
    }

    /// Hardware address, when the device has an Ethernet-sized one.
    pub fn mac(&self) -> Option<MacAddr> {
        self.address.as_deref().and_then(MacAddr::from_bytes)
    }
}

impl FromNetlink for LinkMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfInfoMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header = IfInfoMsg::from_bytes(parse_header(input, IfInfoMsg::SIZE)?)
            .map_err(|_| cut())?;

        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        for (kind, data) in parse_attrs(input) {
            match kind {
                ifla::IFNAME => msg.name = Some(parse_string_from_bytes(data)),
                ifla::ADDRESS => msg.address = Some(data.to_vec()),
                _ => {}
            }
        }

        Ok(msg)
    }
}
