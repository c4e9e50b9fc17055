//! Reading the current state.

use crate::netlink::{Connection, Error, LinkMessage, Result, namespace};

use super::snapshot::{DefaultRoute, InterfaceLocation, NamespaceSnapshot, ObservedInterface};

/// Read-only view of the kernel's namespace and network state.
///
/// Absence of the namespace, interface, addresses or routes is reported in
/// the snapshot, never as an error. An error means the state could not be
/// read at all.
#[allow(async_fn_in_trait)]
pub trait StateInspector {
    async fn inspect(&self, namespace: &str, interface: &str) -> Result<NamespaceSnapshot>;
}

/// Inspector backed by rtnetlink.
///
/// Looks for the interface in the target namespace, in the namespace this
/// process runs in, and in every other named namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkInspector;

impl NetlinkInspector {
    pub fn new() -> Self {
        Self
    }
}

impl StateInspector for NetlinkInspector {
    async fn inspect(&self, ns: &str, interface: &str) -> Result<NamespaceSnapshot> {
        let mut snapshot = NamespaceSnapshot::absent(ns, interface);

        let host = Connection::new()?;
        if let Some(link) = host.get_link_by_name(interface).await? {
            snapshot = snapshot.with_interface(observed(InterfaceLocation::Host, &link));
        }

        match namespace::connection_for(ns) {
            Ok(conn) => snapshot = scan_target(snapshot.with_namespace(), &conn, interface).await?,
            Err(e) if e.is_not_found() => {
                tracing::debug!(namespace = ns, "namespace not present");
            }
            Err(e) if vanished(&e) => {
                tracing::warn!(
                    namespace = ns,
                    error = %e,
                    "namespace file is not a mounted namespace, treating as absent"
                );
            }
            Err(e) => return Err(e),
        }

        for other in namespace::list()? {
            if other == ns {
                continue;
            }
            match find_in(&other, interface).await {
                Ok(Some(link)) => {
                    snapshot = snapshot
                        .with_interface(observed(InterfaceLocation::Namespace(other), &link));
                }
                Ok(None) => {}
                Err(e) if vanished(&e) => {
                    tracing::warn!(namespace = %other, error = %e, "skipping unreadable namespace");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(snapshot)
    }
}

async fn scan_target(
    mut snapshot: NamespaceSnapshot,
    conn: &Connection,
    interface: &str,
) -> Result<NamespaceSnapshot> {
    let links = conn.get_links().await?;

    if let Some(lo) = links.iter().find(|l| l.is_loopback()) {
        snapshot = snapshot.with_loopback(lo.is_up());
    }

    let Some(link) = links.iter().find(|l| l.name() == Some(interface)) else {
        return Ok(snapshot);
    };
    let ifindex = link.ifindex();
    let location = InterfaceLocation::Namespace(snapshot.namespace().to_string());
    snapshot = snapshot.with_interface(observed(location, link));

    for addr in conn.get_addresses_by_index(ifindex).await? {
        if let Some(cidr) = addr.cidr() {
            snapshot = snapshot.with_address(cidr);
        }
    }

    for route in conn.get_default_routes().await? {
        snapshot = snapshot.with_default_route(DefaultRoute {
            family: route.family(),
            gateway: route.gateway().copied(),
            oif: route.oif(),
        });
    }

    Ok(snapshot)
}

async fn find_in(ns: &str, interface: &str) -> Result<Option<LinkMessage>> {
    let conn = namespace::connection_for(ns)?;
    conn.get_link_by_name(interface).await
}

/// A namespace deleted mid-scan, or a stale file left behind by one.
fn vanished(e: &Error) -> bool {
    e.is_not_found() || e.errno() == Some(libc::EINVAL)
}

fn observed(location: InterfaceLocation, link: &LinkMessage) -> ObservedInterface {
    ObservedInterface {
        location,
        ifindex: link.ifindex(),
        up: link.is_up(),
        hw_address: link.mac(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vanished() {
        assert!(vanished(&Error::NamespaceNotFound { name: "x".into() }));
        assert!(vanished(&Error::from_errno(-libc::EINVAL)));
        assert!(!vanished(&Error::from_errno(-libc::EPERM)));
    }
}
