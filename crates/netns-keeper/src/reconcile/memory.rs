//! In-memory host model for exercising passes without root.
//!
//! Implements both [`StateInspector`] and [`ActionExecutor`] over a small
//! table of namespaces and devices that follows the kernel rules the engine
//! relies on: moving a device drops its addresses and sets it down, names are
//! unique per namespace, and a duplicate address or default route is
//! rejected with `EEXIST`.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use crate::netlink::{Error, Result};
use crate::util::addr::family_of;
use crate::util::{Cidr, MacAddr};

use super::execute::ActionExecutor;
use super::inspect::StateInspector;
use super::plan::{Action, ActionKind};
use super::snapshot::{DefaultRoute, InterfaceLocation, NamespaceSnapshot, ObservedInterface};

#[derive(Debug, Clone)]
struct Device {
    name: String,
    location: InterfaceLocation,
    ifindex: u32,
    up: bool,
    hw_address: Option<MacAddr>,
    addresses: Vec<Cidr>,
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeSet<String>,
    loopback_up: BTreeMap<String, bool>,
    routes: BTreeMap<String, Vec<DefaultRoute>>,
    devices: Vec<Device>,
    next_ifindex: u32,
    fail_on: Option<ActionKind>,
    fail_inspection: bool,
    executed: Vec<Action>,
}

/// A simulated host.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    /// An empty host: no named namespaces, no devices.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a device to the host namespace.
    pub fn with_host_interface(self, name: &str, hw_address: Option<MacAddr>) -> Self {
        self.add_device(name, InterfaceLocation::Host, hw_address);
        self
    }

    /// Add a device to a named namespace, creating the namespace if needed.
    pub fn with_interface_in(self, ns: &str, name: &str, hw_address: Option<MacAddr>) -> Self {
        self.create_namespace(ns);
        self.add_device(name, InterfaceLocation::Namespace(ns.to_string()), hw_address);
        self
    }

    /// Make the executor fail every action of this kind.
    pub fn fail_on(self, kind: ActionKind) -> Self {
        self.lock().fail_on = Some(kind);
        self
    }

    /// Make inspection fail as if rtnetlink were unavailable.
    pub fn fail_inspection(&self, fail: bool) {
        self.lock().fail_inspection = fail;
    }

    /// Create a namespace behind the engine's back.
    pub fn create_namespace(&self, ns: &str) {
        let mut state = self.lock();
        if state.namespaces.insert(ns.to_string()) {
            state.loopback_up.insert(ns.to_string(), false);
        }
    }

    /// Add an address behind the engine's back.
    pub fn add_address(&self, ns: &str, interface: &str, cidr: Cidr) {
        let mut state = self.lock();
        let location = InterfaceLocation::Namespace(ns.to_string());
        if let Some(dev) = state
            .devices
            .iter_mut()
            .find(|d| d.name == interface && d.location == location)
        {
            dev.addresses.push(cidr);
        }
    }

    /// Add a default route behind the engine's back.
    pub fn add_route(&self, ns: &str, gateway: IpAddr) {
        self.lock()
            .routes
            .entry(ns.to_string())
            .or_default()
            .push(DefaultRoute {
                family: family_of(&gateway),
                gateway: Some(gateway),
                oif: None,
            });
    }

    /// Delete a namespace, returning its devices to the host.
    pub fn delete_namespace(&self, ns: &str) -> bool {
        let mut state = self.lock();
        if !state.namespaces.remove(ns) {
            return false;
        }
        state.loopback_up.remove(ns);
        state.routes.remove(ns);
        let location = InterfaceLocation::Namespace(ns.to_string());
        for dev in state.devices.iter_mut().filter(|d| d.location == location) {
            dev.location = InterfaceLocation::Host;
            dev.up = false;
            dev.addresses.clear();
        }
        true
    }

    /// Actions the executor accepted, in order.
    pub fn executed(&self) -> Vec<Action> {
        self.lock().executed.clone()
    }

    /// Where the named devices currently live.
    pub fn locations_of(&self, name: &str) -> Vec<InterfaceLocation> {
        self.lock()
            .devices
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.location.clone())
            .collect()
    }

    fn add_device(&self, name: &str, location: InterfaceLocation, hw_address: Option<MacAddr>) {
        let mut state = self.lock();
        // Index 1 belongs to lo.
        state.next_ifindex = state.next_ifindex.max(1) + 1;
        let ifindex = state.next_ifindex;
        state.devices.push(Device {
            name: name.to_string(),
            location,
            ifindex,
            up: false,
            hw_address,
            addresses: Vec::new(),
        });
    }
}

impl State {
    fn device_mut(&mut self, ns: &str, name: &str) -> Result<&mut Device> {
        if !self.namespaces.contains(ns) {
            return Err(Error::NamespaceNotFound {
                name: ns.to_string(),
            });
        }
        let location = InterfaceLocation::Namespace(ns.to_string());
        self.devices
            .iter_mut()
            .find(|d| d.name == name && d.location == location)
            .ok_or_else(|| Error::InterfaceNotFound {
                name: name.to_string(),
            })
    }

    fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::CreateNamespace { namespace } => {
                if !self.namespaces.insert(namespace.clone()) {
                    return Err(Error::NamespaceExists {
                        name: namespace.clone(),
                    });
                }
                self.loopback_up.insert(namespace.clone(), false);
            }

            Action::MoveInterface {
                interface,
                from,
                namespace,
                hw_address,
            } => {
                if !self.namespaces.contains(namespace) {
                    return Err(Error::NamespaceNotFound {
                        name: namespace.clone(),
                    });
                }
                let dest = InterfaceLocation::Namespace(namespace.clone());
                if self
                    .devices
                    .iter()
                    .any(|d| d.name == *interface && d.location == dest)
                {
                    return Err(Error::from_errno(-libc::EEXIST));
                }
                let dev = self
                    .devices
                    .iter_mut()
                    .find(|d| {
                        d.name == *interface
                            && d.location == *from
                            && hw_address.is_none_or(|mac| d.hw_address == Some(mac))
                    })
                    .ok_or_else(|| Error::InterfaceNotFound {
                        name: interface.clone(),
                    })?;
                dev.location = dest;
                dev.up = false;
                dev.addresses.clear();
            }

            Action::AddAddress {
                namespace,
                interface,
                address,
            } => {
                let dev = self.device_mut(namespace, interface)?;
                if dev.addresses.contains(address) {
                    return Err(Error::from_errno(-libc::EEXIST));
                }
                dev.addresses.push(*address);
            }

            Action::RemoveAddress {
                namespace,
                interface,
                address,
            } => {
                let dev = self.device_mut(namespace, interface)?;
                let before = dev.addresses.len();
                dev.addresses.retain(|a| a != address);
                if dev.addresses.len() == before {
                    return Err(Error::from_errno(-libc::EADDRNOTAVAIL));
                }
            }

            Action::SetLinkUp {
                namespace,
                interface,
            } => {
                if interface == "lo" {
                    let lo = self.loopback_up.get_mut(namespace).ok_or_else(|| {
                        Error::NamespaceNotFound {
                            name: namespace.clone(),
                        }
                    })?;
                    *lo = true;
                } else {
                    self.device_mut(namespace, interface)?.up = true;
                }
            }

            Action::AddDefaultRoute {
                namespace,
                interface,
                gateway,
                ..
            } => {
                let oif = self.device_mut(namespace, interface)?.ifindex;
                let family = family_of(gateway);
                let routes = self.routes.entry(namespace.clone()).or_default();
                if routes.iter().any(|r| r.family == family) {
                    return Err(Error::from_errno(-libc::EEXIST));
                }
                routes.push(DefaultRoute {
                    family,
                    gateway: Some(*gateway),
                    oif: Some(oif),
                });
            }
        }
        Ok(())
    }
}

impl StateInspector for MemoryHost {
    async fn inspect(&self, ns: &str, interface: &str) -> Result<NamespaceSnapshot> {
        let state = self.lock();
        if state.fail_inspection {
            return Err(Error::from_errno(-libc::EPERM));
        }

        let mut snapshot = NamespaceSnapshot::absent(ns, interface);
        if state.namespaces.contains(ns) {
            snapshot = snapshot.with_namespace();
            if let Some(up) = state.loopback_up.get(ns) {
                snapshot = snapshot.with_loopback(*up);
            }
            for route in state.routes.get(ns).into_iter().flatten() {
                snapshot = snapshot.with_default_route(route.clone());
            }
        }

        for dev in state.devices.iter().filter(|d| d.name == interface) {
            snapshot = snapshot.with_interface(ObservedInterface {
                location: dev.location.clone(),
                ifindex: dev.ifindex,
                up: dev.up,
                hw_address: dev.hw_address,
            });
            if dev.location.namespace() == Some(ns) {
                for cidr in &dev.addresses {
                    snapshot = snapshot.with_address(*cidr);
                }
            }
        }

        Ok(snapshot)
    }
}

impl ActionExecutor for MemoryHost {
    async fn execute(&self, action: &Action) -> Result<()> {
        let mut state = self.lock();
        if state.fail_on == Some(action.kind()) {
            return Err(Error::from_errno(-libc::EPERM).with_context(action.to_string()));
        }
        state.apply(action)?;
        state.executed.push(action.clone());
        Ok(())
    }
}
