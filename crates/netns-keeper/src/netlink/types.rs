//! Fixed-size rtnetlink family headers and the constants that go with them.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Interface flags (IFF_*).
pub mod iff {
    pub const UP: u32 = 0x1;
    pub const LOOPBACK: u32 = 0x8;
}

/// Link attributes (IFLA_*).
pub mod ifla {
    pub const ADDRESS: u16 = 1;
    pub const IFNAME: u16 = 3;
    pub const MTU: u16 = 4;
    pub const OPERSTATE: u16 = 16;
    pub const NET_NS_FD: u16 = 28;
}

/// Address attributes (IFA_*).
pub mod ifa {
    pub const ADDRESS: u16 = 1;
    pub const LOCAL: u16 = 2;
    pub const LABEL: u16 = 3;
}

/// Route attributes (RTA_*).
pub mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
    pub const TABLE: u16 = 15;
}

/// Route table, protocol, scope and type values.
pub mod rt {
    pub const TABLE_MAIN: u8 = 254;
    pub const PROT_BOOT: u8 = 3;
    pub const SCOPE_UNIVERSE: u8 = 0;
    pub const SCOPE_LINK: u8 = 253;
    pub const TYPE_UNICAST: u8 = 1;
    /// RTNH_F_ONLINK: gateway is directly reachable even if outside any prefix.
    pub const F_ONLINK: u32 = 4;
}

fn truncated(expected: usize, actual: usize) -> Error {
    Error::Truncated { expected, actual }
}

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (usually AF_UNSPEC).
    pub ifi_family: u8,
    /// Padding.
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new interface info message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.ifi_index = index as i32;
        self
    }

    /// Set flags and the mask of flags the kernel should look at.
    pub fn with_flags(mut self, flags: u32, change: u32) -> Self {
        self.ifi_flags = flags;
        self.ifi_change = change;
        self
    }

    /// Parse from the front of a buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(msg, _)| msg)
            .map_err(|_| truncated(Self::SIZE, data.len()))
    }
}

/// Interface address message (struct ifaddrmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfAddrMsg {
    /// Address family (AF_INET, AF_INET6).
    pub ifa_family: u8,
    /// Prefix length.
    pub ifa_prefixlen: u8,
    /// Address flags (IFA_F_*).
    pub ifa_flags: u8,
    /// Address scope.
    pub ifa_scope: u8,
    /// Interface index.
    pub ifa_index: u32,
}

impl IfAddrMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new address message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.ifa_family = family;
        self
    }

    /// Set the prefix length.
    pub fn with_prefixlen(mut self, prefixlen: u8) -> Self {
        self.ifa_prefixlen = prefixlen;
        self
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.ifa_index = index;
        self
    }

    /// Parse from the front of a buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(msg, _)| msg)
            .map_err(|_| truncated(Self::SIZE, data.len()))
    }
}

/// Route message (struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    /// Address family.
    pub rtm_family: u8,
    /// Destination prefix length.
    pub rtm_dst_len: u8,
    /// Source prefix length.
    pub rtm_src_len: u8,
    /// TOS filter.
    pub rtm_tos: u8,
    /// Routing table ID.
    pub rtm_table: u8,
    /// Routing protocol (RTPROT_*).
    pub rtm_protocol: u8,
    /// Route scope (RT_SCOPE_*).
    pub rtm_scope: u8,
    /// Route type (RTN_*).
    pub rtm_type: u8,
    /// Route flags.
    pub rtm_flags: u32,
}

impl RtMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new route message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header for a unicast route in the main table, installed at boot.
    pub fn unicast(family: u8) -> Self {
        Self {
            rtm_family: family,
            rtm_table: rt::TABLE_MAIN,
            rtm_protocol: rt::PROT_BOOT,
            rtm_scope: rt::SCOPE_UNIVERSE,
            rtm_type: rt::TYPE_UNICAST,
            ..Self::default()
        }
    }

    /// Set the route flags.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.rtm_flags = flags;
        self
    }

    /// Parse from the front of a buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(msg, _)| msg)
            .map_err(|_| truncated(Self::SIZE, data.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes_match_kernel() {
        assert_eq!(IfInfoMsg::SIZE, 16);
        assert_eq!(IfAddrMsg::SIZE, 8);
        assert_eq!(RtMsg::SIZE, 12);
    }

    #[test]
    fn test_unicast_route_header() {
        let hdr = RtMsg::unicast(libc::AF_INET as u8).with_flags(rt::F_ONLINK);
        assert_eq!(hdr.rtm_table, 254);
        assert_eq!(hdr.rtm_protocol, 3);
        assert_eq!(hdr.rtm_type, 1);
        assert_eq!(hdr.rtm_dst_len, 0);
        assert_eq!(hdr.rtm_flags, 4);
    }

    #[test]
    fn test_from_bytes_truncated() {
        assert!(matches!(
            IfInfoMsg::from_bytes(&[0; 8]),
            Err(Error::Truncated {
                expected: 16,
                actual: 8
            })
        ));
    }
}
