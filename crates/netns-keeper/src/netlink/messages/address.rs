//! Strongly-typed address message.

use std::net::IpAddr;

use zerocopy::IntoBytes;

use crate::netlink::parse::{
    FromNetlink, PResult, cut, parse_attrs, parse_header, parse_ip_addr,
};
use crate::netlink::types::{IfAddrMsg, ifa};
use crate::util::Cidr;

/// A parsed RTM_NEWADDR message.
#[derive(Debug, Clone, Default)]
pub struct AddressMessage {
    pub(crate) header: IfAddrMsg,
    /// Peer or prefix address (IFA_ADDRESS).
    pub(crate) address: Option<IpAddr>,
    /// Local address (IFA_LOCAL).
    pub(crate) local: Option<IpAddr>,
}

impl AddressMessage {
    /// Address family.
    pub fn family(&self) -> u8 {
        self.header.ifa_family
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.header.ifa_prefixlen
    }

    /// Index of the interface carrying the address.
    pub fn ifindex(&self) -> u32 {
        self.header.ifa_index
    }

    /// The address as configured on the interface.
    ///
    /// IFA_LOCAL wins over IFA_ADDRESS; they only differ on point-to-point
    /// links where IFA_ADDRESS is the peer.
    pub fn primary_address(&self) -> Option<&IpAddr> {
        self.local.as_ref().or(self.address.as_ref())
    }

    /// The address with its prefix length.
    pub fn cidr(&self) -> Option<Cidr> {
        self.primary_address()
            .and_then(|addr| Cidr::new(*addr, self.prefix_len()).ok())
    }
}

impl FromNetlink for AddressMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfAddrMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header = IfAddrMsg::from_bytes(parse_header(input, IfAddrMsg::SIZE)?)
            .map_err(|_| cut())?;

        let mut msg = AddressMessage {
            header,
            ..Default::default()
        };

        for (kind, data) in parse_attrs(input) {
            match kind {
                ifa::ADDRESS => msg.address = parse_ip_addr(data, header.ifa_family).ok(),
                ifa::LOCAL => msg.local = parse_ip_addr(data, header.ifa_family).ok(),
                _ => {}
            }
        }

        Ok(msg)
    }
}
