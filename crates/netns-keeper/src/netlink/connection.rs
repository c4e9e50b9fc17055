//! rtnetlink connection with request/response handling.

use std::net::IpAddr;
use std::os::unix::io::RawFd;

use super::attr::{AttrIter, NLMSGERR_ATTR_MSG, get};
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_ACK, NLM_F_ACK_TLVS, NLM_F_CAPPED, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL,
    NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgError, NlMsgHdr, NlMsgType, nlmsg_align,
};
use super::messages::{AddressMessage, LinkMessage, RouteMessage};
use super::parse::FromNetlink;
use super::socket::NetlinkSocket;
use super::types::{IfAddrMsg, IfInfoMsg, RtMsg, iff, ifa, ifla, rt, rta};
use crate::util::Cidr;
use crate::util::addr::family_of;

/// A NETLINK_ROUTE connection bound to one network namespace.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Create a connection in the caller's network namespace.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Create a connection inside the namespace behind an open nsfs fd.
    pub fn new_in_namespace(ns_fd: RawFd) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new_in_namespace(ns_fd)?,
        })
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, mut builder: MessageBuilder) -> Result<()> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        self.socket.send(&builder.finish()).await?;

        loop {
            let data = self.socket.recv_msg().await?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq || !header.is_error() {
                    continue;
                }

                let err = NlMsgError::from_bytes(payload)?;
                if err.is_ack() {
                    return Ok(());
                }
                return Err(kernel_error(&header, payload, &err));
            }
        }
    }

    /// Send a dump request and collect the payload of every reply message.
    pub async fn dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        self.socket.send(&builder.finish()).await?;

        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;

                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_done() {
                    return Ok(responses);
                }

                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(kernel_error(&header, payload, &err));
                    }
                    continue;
                }

                responses.push(payload.to_vec());
            }
        }
    }

    /// Dump and parse every reply into a typed message.
    ///
    /// Messages that fail to parse are logged and skipped.
    pub async fn dump_typed<T: FromNetlink>(&self, msg_type: u16) -> Result<Vec<T>> {
        let mut builder = dump_request(msg_type);

        let mut header_buf = Vec::new();
        T::write_dump_header(&mut header_buf);
        builder.append_bytes(&header_buf);

        let responses = self.dump(builder).await?;

        let mut parsed = Vec::with_capacity(responses.len());
        for payload in responses {
            match T::from_bytes(&payload) {
                Ok(msg) => parsed.push(msg),
                Err(e) => tracing::debug!(msg_type, error = %e, "skipping unparsable message"),
            }
        }

        Ok(parsed)
    }
}

/// Build an error from an NLMSG_ERROR reply, appending the extended ACK text.
fn kernel_error(header: &NlMsgHdr, payload: &[u8], err: &NlMsgError) -> Error {
    let base = Error::from_errno(err.error);
    if header.nlmsg_flags & NLM_F_ACK_TLVS == 0 {
        return base;
    }

    let mut offset = std::mem::size_of::<NlMsgError>();
    if header.nlmsg_flags & NLM_F_CAPPED == 0 {
        offset += (err.msg.nlmsg_len as usize).saturating_sub(NLMSG_HDRLEN);
    }
    let offset = nlmsg_align(offset);

    let ext = payload
        .get(offset..)
        .into_iter()
        .flat_map(AttrIter::new)
        .find(|(kind, _)| *kind == NLMSGERR_ATTR_MSG)
        .and_then(|(_, data)| get::string(data).ok().map(str::to_owned));

    match (base, ext) {
        (Error::Kernel { errno, message }, Some(ext)) if !ext.is_empty() => Error::Kernel {
            errno,
            message: format!("{}: {}", message, ext),
        },
        (base, _) => base,
    }
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Helper to build a request expecting ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Helper to build an exclusive create request (fails with EEXIST).
pub fn create_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(
        msg_type,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    )
}

// ============================================================================
// Queries
// ============================================================================

impl Connection {
    /// Get all network interfaces.
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        self.dump_typed(NlMsgType::RTM_GETLINK).await
    }

    /// Get a network interface by name.
    ///
    /// Returns `None` if the interface doesn't exist.
    pub async fn get_link_by_name(&self, name: &str) -> Result<Option<LinkMessage>> {
        let links = self.get_links().await?;
        Ok(links.into_iter().find(|l| l.name() == Some(name)))
    }

    /// Resolve an interface name to its index within this namespace.
    pub async fn ifindex(&self, name: &str) -> Result<u32> {
        self.get_link_by_name(name)
            .await?
            .map(|l| l.ifindex())
            .ok_or_else(|| Error::InterfaceNotFound {
                name: name.to_string(),
            })
    }

    /// Get all addresses.
    pub async fn get_addresses(&self) -> Result<Vec<AddressMessage>> {
        self.dump_typed(NlMsgType::RTM_GETADDR).await
    }

    /// Get the addresses carried by one interface.
    pub async fn get_addresses_by_index(&self, ifindex: u32) -> Result<Vec<AddressMessage>> {
        let addrs = self.get_addresses().await?;
        Ok(addrs.into_iter().filter(|a| a.ifindex() == ifindex).collect())
    }

    /// Get all routes (every table, both families).
    pub async fn get_routes(&self) -> Result<Vec<RouteMessage>> {
        self.dump_typed(NlMsgType::RTM_GETROUTE).await
    }

    /// Get the default routes of the main table.
    pub async fn get_default_routes(&self) -> Result<Vec<RouteMessage>> {
        let routes = self.get_routes().await?;
        Ok(routes
            .into_iter()
            .filter(|r| r.is_default() && r.is_main_unicast())
            .collect())
    }
}

// ============================================================================
// Mutations
// ============================================================================

impl Connection {
    /// Set an interface administratively up.
    pub async fn set_link_up_by_index(&self, ifindex: u32) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex).with_flags(iff::UP, iff::UP));

        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("setting link {} up", ifindex)))
    }

    /// Move an interface into the namespace behind `ns_fd`.
    ///
    /// Must be sent on a connection in the namespace the interface currently
    /// lives in. The kernel resets the interface to down and drops its
    /// addresses on the way over.
    pub async fn set_link_netns_fd_by_index(&self, ifindex: u32, ns_fd: RawFd) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(ifindex));
        builder.append_attr_i32(ifla::NET_NS_FD, ns_fd);

        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("moving link {} to namespace", ifindex)))
    }

    /// Add an address to an interface. Fails with EEXIST if already present.
    pub async fn add_address_by_index(&self, ifindex: u32, cidr: &Cidr) -> Result<()> {
        let mut builder = create_request(NlMsgType::RTM_NEWADDR);
        builder.append(&address_header(ifindex, cidr));
        builder.append_attr_ip(ifa::LOCAL, &cidr.addr());
        builder.append_attr_ip(ifa::ADDRESS, &cidr.addr());

        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("adding {} to link {}", cidr, ifindex)))
    }

    /// Remove an address from an interface.
    pub async fn del_address_by_index(&self, ifindex: u32, cidr: &Cidr) -> Result<()> {
        let mut builder = ack_request(NlMsgType::RTM_DELADDR);
        builder.append(&address_header(ifindex, cidr));
        builder.append_attr_ip(ifa::LOCAL, &cidr.addr());

        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("removing {} from link {}", cidr, ifindex)))
    }

    /// Add a default route via `gateway` in the main table.
    ///
    /// With `onlink` the kernel accepts a gateway outside every connected
    /// prefix of `oif`. Fails with EEXIST if a default route already exists.
    pub async fn add_default_route(
        &self,
        gateway: IpAddr,
        oif: Option<u32>,
        onlink: bool,
    ) -> Result<()> {
        let mut header = RtMsg::unicast(family_of(&gateway));
        if onlink {
            header = header.with_flags(rt::F_ONLINK);
        }

        let mut builder = create_request(NlMsgType::RTM_NEWROUTE);
        builder.append(&header);
        builder.append_attr_ip(rta::GATEWAY, &gateway);
        if let Some(oif) = oif {
            builder.append_attr_u32(rta::OIF, oif);
        }

        self.request_ack(builder)
            .await
            .map_err(|e| e.with_context(format!("adding default route via {}", gateway)))
    }
}

fn address_header(ifindex: u32, cidr: &Cidr) -> IfAddrMsg {
    IfAddrMsg::new()
        .with_family(cidr.family())
        .with_prefixlen(cidr.prefix_len())
        .with_index(ifindex)
}
