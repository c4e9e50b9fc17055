//! Applying single actions to the kernel.

use std::os::unix::io::AsRawFd;

use crate::netlink::{Connection, Error, Result, namespace};

use super::plan::Action;
use super::snapshot::InterfaceLocation;

/// Performs one action at a time. The only write path into the kernel.
#[allow(async_fn_in_trait)]
pub trait ActionExecutor {
    async fn execute(&self, action: &Action) -> Result<()>;
}

/// Executor backed by rtnetlink and the namespace run directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkExecutor;

impl NetlinkExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ActionExecutor for NetlinkExecutor {
    async fn execute(&self, action: &Action) -> Result<()> {
        match action {
            Action::CreateNamespace { namespace } => namespace::create(namespace),

            Action::MoveInterface {
                interface,
                from,
                namespace: ns,
                hw_address,
            } => {
                let source = match from {
                    InterfaceLocation::Host => Connection::new()?,
                    InterfaceLocation::Namespace(name) => namespace::connection_for(name)?,
                };

                // Resolve again: the index seen at planning time may be stale.
                let link = source
                    .get_link_by_name(interface)
                    .await?
                    .filter(|l| hw_address.is_none_or(|mac| l.mac() == Some(mac)))
                    .ok_or_else(|| Error::InterfaceNotFound {
                        name: format!("{} in {}", interface, from),
                    })?;

                let target = namespace::open(ns)?;
                source
                    .set_link_netns_fd_by_index(link.ifindex(), target.as_raw_fd())
                    .await
            }

            Action::AddAddress {
                namespace: ns,
                interface,
                address,
            } => {
                let conn = namespace::connection_for(ns)?;
                let ifindex = conn.ifindex(interface).await?;
                conn.add_address_by_index(ifindex, address).await
            }

            Action::RemoveAddress {
                namespace: ns,
                interface,
                address,
            } => {
                let conn = namespace::connection_for(ns)?;
                let ifindex = conn.ifindex(interface).await?;
                conn.del_address_by_index(ifindex, address).await
            }

            Action::SetLinkUp {
                namespace: ns,
                interface,
            } => {
                let conn = namespace::connection_for(ns)?;
                let ifindex = conn.ifindex(interface).await?;
                conn.set_link_up_by_index(ifindex).await
            }

            Action::AddDefaultRoute {
                namespace: ns,
                interface,
                gateway,
                onlink,
            } => {
                let conn = namespace::connection_for(ns)?;
                let ifindex = conn.ifindex(interface).await?;
                conn.add_default_route(*gateway, Some(ifindex), *onlink)
                    .await
            }
        }
    }
}
