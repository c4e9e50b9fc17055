//! Strongly-typed route message.

use std::net::IpAddr;

use zerocopy::IntoBytes;

use crate::netlink::parse::{
    FromNetlink, PResult, cut, parse_attrs, parse_header, parse_ip_addr, parse_u32_ne,
};
use crate::netlink::types::{RtMsg, rt, rta};

/// A parsed RTM_NEWROUTE message.
#[derive(Debug, Clone, Default)]
pub struct RouteMessage {
    pub(crate) header: RtMsg,
    pub(crate) destination: Option<IpAddr>,
    pub(crate) oif: Option<u32>,
    pub(crate) gateway: Option<IpAddr>,
    pub(crate) table: Option<u32>,
}

impl RouteMessage {
    /// Address family.
    pub fn family(&self) -> u8 {
        self.header.rtm_family
    }

    /// Routing table ID (RTA_TABLE overrides the 8-bit header field).
    pub fn table_id(&self) -> u32 {
        self.table.unwrap_or(self.header.rtm_table as u32)
    }

    /// Output interface index.
    pub fn oif(&self) -> Option<u32> {
        self.oif
    }

    /// Gateway address.
    pub fn gateway(&self) -> Option<&IpAddr> {
        self.gateway.as_ref()
    }

    /// Default route (0.0.0.0/0 or ::/0).
    pub fn is_default(&self) -> bool {
        self.header.rtm_dst_len == 0 && self.destination.is_none_or(|d| d.is_unspecified())
    }

    /// Unicast route in the main table.
    pub fn is_main_unicast(&self) -> bool {
        self.header.rtm_type == rt::TYPE_UNICAST && self.table_id() == rt::TABLE_MAIN as u32
    }
}

impl FromNetlink for RouteMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(RtMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header =
            RtMsg::from_bytes(parse_header(input, RtMsg::SIZE)?).map_err(|_| cut())?;

        let mut msg = RouteMessage {
            header,
            ..Default::default()
        };

        for (kind, data) in parse_attrs(input) {
            match kind {
                rta::DST => msg.destination = parse_ip_addr(data, header.rtm_family).ok(),
                rta::OIF => msg.oif = parse_u32_ne(data),
                rta::GATEWAY => msg.gateway = parse_ip_addr(data, header.rtm_family).ok(),
                rta::TABLE => msg.table = parse_u32_ne(data),
                _ => {}
            }
        }

        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::message::NLMSG_HDRLEN;

    fn route_payload(dst: Option<(&str, u8)>, gateway: Option<&str>, oif: u32) -> Vec<u8> {
        let mut header = RtMsg::unicast(libc::AF_INET as u8);
        if let Some((_, len)) = dst {
            header.rtm_dst_len = len;
        }
        let mut b = MessageBuilder::new(24, 0);
        b.append(&header);
        if let Some((addr, _)) = dst {
            b.append_attr_ip(rta::DST, &addr.parse().unwrap());
        }
        if let Some(gw) = gateway {
            b.append_attr_ip(rta::GATEWAY, &gw.parse().unwrap());
        }
        b.append_attr_u32(rta::OIF, oif);
        b.append_attr_u32(rta::TABLE, 254);
        b.finish()[NLMSG_HDRLEN..].to_vec()
    }

    #[test]
    fn test_parse_default_route() {
        let route = RouteMessage::from_bytes(&route_payload(None, Some("10.0.0.1"), 3)).unwrap();
        assert!(route.is_default());
        assert!(route.is_main_unicast());
        assert_eq!(route.gateway(), Some(&"10.0.0.1".parse().unwrap()));
        assert_eq!(route.oif(), Some(3));
    }

    #[test]
    fn test_prefix_route_is_not_default() {
        let route =
            RouteMessage::from_bytes(&route_payload(Some(("10.0.0.0", 24)), None, 3)).unwrap();
        assert!(!route.is_default());
        assert_eq!(route.table_id(), 254);
    }
}
