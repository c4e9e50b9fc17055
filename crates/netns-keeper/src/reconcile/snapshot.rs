//! Observed state of a namespace, as seen by one inspection.

use std::fmt;
use std::net::IpAddr;

use crate::util::{Cidr, MacAddr};

/// Where an interface currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum InterfaceLocation {
    /// The namespace this process runs in.
    Host,
    /// A named namespace under the run directory.
    Namespace(String),
}

impl InterfaceLocation {
    /// The namespace name, or `None` for the host.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            InterfaceLocation::Host => None,
            InterfaceLocation::Namespace(name) => Some(name),
        }
    }
}

impl fmt::Display for InterfaceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceLocation::Host => f.write_str("host"),
            InterfaceLocation::Namespace(name) => write!(f, "netns {}", name),
        }
    }
}

/// A device carrying the target interface name somewhere on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ObservedInterface {
    pub location: InterfaceLocation,
    pub ifindex: u32,
    /// Administratively up (IFF_UP).
    pub up: bool,
    pub hw_address: Option<MacAddr>,
}

impl ObservedInterface {
    /// Whether this device satisfies an optional hardware-address pin.
    pub fn matches(&self, pin: Option<MacAddr>) -> bool {
        pin.is_none_or(|mac| self.hw_address == Some(mac))
    }
}

/// A default route in the main table of the target namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DefaultRoute {
    /// `AF_INET` or `AF_INET6`.
    pub family: u8,
    pub gateway: Option<IpAddr>,
    pub oif: Option<u32>,
}

/// Snapshot of everything the planner looks at.
///
/// Built once per inspection and never changed afterwards; the `with_*`
/// methods consume and return the snapshot so it can only be assembled
/// before it is handed out. Anything not observed is simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NamespaceSnapshot {
    namespace: String,
    interface: String,
    namespace_exists: bool,
    interfaces: Vec<ObservedInterface>,
    addresses: Vec<Cidr>,
    default_routes: Vec<DefaultRoute>,
    loopback_up: Option<bool>,
}

impl NamespaceSnapshot {
    /// A snapshot in which nothing was found.
    pub fn absent(namespace: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            interface: interface.into(),
            namespace_exists: false,
            interfaces: Vec::new(),
            addresses: Vec::new(),
            default_routes: Vec::new(),
            loopback_up: None,
        }
    }

    /// Record that the namespace exists.
    pub fn with_namespace(mut self) -> Self {
        self.namespace_exists = true;
        self
    }

    /// Record a device carrying the interface name.
    pub fn with_interface(mut self, observed: ObservedInterface) -> Self {
        self.interfaces.push(observed);
        self
    }

    /// Record an address on the interface inside the namespace.
    pub fn with_address(mut self, cidr: Cidr) -> Self {
        if !self.addresses.contains(&cidr) {
            self.addresses.push(cidr);
        }
        self
    }

    /// Record a default route inside the namespace.
    pub fn with_default_route(mut self, route: DefaultRoute) -> Self {
        self.default_routes.push(route);
        self
    }

    /// Record the loopback state inside the namespace.
    pub fn with_loopback(mut self, up: bool) -> Self {
        self.loopback_up = Some(up);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn namespace_exists(&self) -> bool {
        self.namespace_exists
    }

    /// Every device with the interface name, wherever it lives.
    pub fn interfaces(&self) -> &[ObservedInterface] {
        &self.interfaces
    }

    /// Addresses on the interface inside the namespace.
    pub fn addresses(&self) -> &[Cidr] {
        &self.addresses
    }

    pub fn default_routes(&self) -> &[DefaultRoute] {
        &self.default_routes
    }

    pub fn loopback_up(&self) -> Option<bool> {
        self.loopback_up
    }

    /// The device with the interface name inside the target namespace.
    pub fn placed(&self) -> Option<&ObservedInterface> {
        self.interfaces
            .iter()
            .find(|i| i.location.namespace() == Some(self.namespace.as_str()))
    }

    /// Devices with the interface name outside the target namespace, host first.
    pub fn elsewhere(&self) -> impl Iterator<Item = &ObservedInterface> {
        let host = self
            .interfaces
            .iter()
            .filter(|i| i.location == InterfaceLocation::Host);
        let others = self.interfaces.iter().filter(|i| {
            matches!(&i.location, InterfaceLocation::Namespace(n) if *n != self.namespace)
        });
        host.chain(others)
    }

    /// Whether the exact address (address and prefix) is on the interface.
    pub fn has_address(&self, cidr: &Cidr) -> bool {
        self.addresses.contains(cidr)
    }

    /// Whether any default route of the given family exists in the namespace.
    pub fn has_default_route(&self, family: u8) -> bool {
        self.default_routes.iter().any(|r| r.family == family)
    }

    /// Whether a link inside the namespace is administratively up.
    ///
    /// Only the target interface and `lo` are observed; anything else reads
    /// as down.
    pub fn is_link_up(&self, name: &str) -> bool {
        if name == "lo" {
            return self.loopback_up == Some(true);
        }
        name == self.interface && self.placed().is_some_and(|i| i.up)
    }
}
