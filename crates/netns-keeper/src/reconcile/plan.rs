//! Planning: from a target and a snapshot to an ordered list of actions.
//!
//! Planning is pure. Each rule builds the predicate that describes its
//! postcondition and emits the action only if the predicate does not already
//! hold, so a converged snapshot always plans to nothing.

use std::fmt;
use std::net::IpAddr;

use super::ReconcileError;
use super::snapshot::{InterfaceLocation, NamespaceSnapshot};
use super::target::{AddressPolicy, NamespaceTarget};
use crate::util::addr::family_of;
use crate::util::{Cidr, MacAddr};

/// Kind of a primitive action, in the order the planner emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ActionKind {
    CreateNamespace,
    MoveInterface,
    AddAddress,
    RemoveAddress,
    SetLinkUp,
    AddDefaultRoute,
}

/// A single kernel mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "action", rename_all = "kebab-case"))]
pub enum Action {
    CreateNamespace {
        namespace: String,
    },
    MoveInterface {
        interface: String,
        from: InterfaceLocation,
        namespace: String,
        hw_address: Option<MacAddr>,
    },
    AddAddress {
        namespace: String,
        interface: String,
        address: Cidr,
    },
    RemoveAddress {
        namespace: String,
        interface: String,
        address: Cidr,
    },
    SetLinkUp {
        namespace: String,
        interface: String,
    },
    AddDefaultRoute {
        namespace: String,
        interface: String,
        gateway: IpAddr,
        onlink: bool,
    },
}

impl Action {
    /// The kind of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CreateNamespace { .. } => ActionKind::CreateNamespace,
            Action::MoveInterface { .. } => ActionKind::MoveInterface,
            Action::AddAddress { .. } => ActionKind::AddAddress,
            Action::RemoveAddress { .. } => ActionKind::RemoveAddress,
            Action::SetLinkUp { .. } => ActionKind::SetLinkUp,
            Action::AddDefaultRoute { .. } => ActionKind::AddDefaultRoute,
        }
    }

    /// The namespace the action works on.
    pub fn namespace(&self) -> &str {
        match self {
            Action::CreateNamespace { namespace }
            | Action::MoveInterface { namespace, .. }
            | Action::AddAddress { namespace, .. }
            | Action::RemoveAddress { namespace, .. }
            | Action::SetLinkUp { namespace, .. }
            | Action::AddDefaultRoute { namespace, .. } => namespace,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateNamespace { namespace } => write!(f, "+ netns {}", namespace),
            Action::MoveInterface {
                interface,
                from,
                namespace,
                ..
            } => write!(f, "~ link {} ({} -> netns {})", interface, from, namespace),
            Action::AddAddress {
                interface, address, ..
            } => write!(f, "+ address {} on {}", address, interface),
            Action::RemoveAddress {
                interface, address, ..
            } => write!(f, "- address {} on {}", address, interface),
            Action::SetLinkUp { interface, .. } => write!(f, "~ link {} up", interface),
            Action::AddDefaultRoute {
                interface,
                gateway,
                onlink,
                ..
            } => {
                write!(f, "+ route default via {} dev {}", gateway, interface)?;
                if *onlink {
                    f.write_str(" onlink")?;
                }
                Ok(())
            }
        }
    }
}

/// A condition on a snapshot under which an action is already done.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "predicate", rename_all = "kebab-case"))]
pub enum Predicate {
    NamespaceExists,
    /// The interface sits in the target namespace (and matches the pin).
    InterfacePlaced { hw_address: Option<MacAddr> },
    AddressPresent { address: Cidr },
    AddressAbsent { address: Cidr },
    LinkUp { interface: String },
    /// Any default route of this family, whatever its gateway.
    DefaultRoutePresent { family: u8 },
}

impl Predicate {
    /// Evaluate against a snapshot.
    pub fn holds(&self, snapshot: &NamespaceSnapshot) -> bool {
        match self {
            Predicate::NamespaceExists => snapshot.namespace_exists(),
            Predicate::InterfacePlaced { hw_address } => snapshot
                .placed()
                .is_some_and(|i| i.matches(*hw_address)),
            Predicate::AddressPresent { address } => snapshot.has_address(address),
            Predicate::AddressAbsent { address } => !snapshot.has_address(address),
            Predicate::LinkUp { interface } => snapshot.is_link_up(interface),
            Predicate::DefaultRoutePresent { family } => snapshot.has_default_route(*family),
        }
    }
}

/// An action together with the predicate that makes it unnecessary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PlannedAction {
    pub action: Action,
    pub predicate: Predicate,
}

/// Ordered actions for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ActionPlan {
    actions: Vec<PlannedAction>,
}

impl ActionPlan {
    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// The planned actions in execution order.
    pub fn actions(&self) -> &[PlannedAction] {
        &self.actions
    }

    /// The action kinds in order.
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|p| p.action.kind()).collect()
    }

    /// Human-readable summary, one line per action.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No changes needed".to_string();
        }

        self.actions
            .iter()
            .map(|p| p.action.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push_unless(&mut self, snapshot: &NamespaceSnapshot, action: Action, predicate: Predicate) {
        if predicate.holds(snapshot) {
            tracing::debug!(%action, "already satisfied");
            return;
        }
        self.actions.push(PlannedAction { action, predicate });
    }
}

impl<'a> IntoIterator for &'a ActionPlan {
    type Item = &'a PlannedAction;
    type IntoIter = std::slice::Iter<'a, PlannedAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Compute the actions that bring `snapshot` to `target`.
///
/// Fails only when the interface cannot be found anywhere, or when the
/// namespace already holds a different device under the interface name.
pub fn plan(
    target: &NamespaceTarget,
    snapshot: &NamespaceSnapshot,
) -> Result<ActionPlan, ReconcileError> {
    let ns = target.namespace();
    let iface = target.interface();
    let pin = target.hw_address();
    let mut plan = ActionPlan::default();

    plan.push_unless(
        snapshot,
        Action::CreateNamespace {
            namespace: ns.to_string(),
        },
        Predicate::NamespaceExists,
    );

    let placed = Predicate::InterfacePlaced { hw_address: pin };
    if !placed.holds(snapshot) {
        let source = snapshot.elsewhere().find(|i| i.matches(pin));

        if let Some(occupant) = snapshot.placed() {
            // A same-named device is in the namespace but fails the pin.
            return Err(match source {
                Some(wanted) => ReconcileError::NamingConflict {
                    interface: iface.to_string(),
                    namespace: ns.to_string(),
                    detail: format!(
                        "the namespace holds {} (ifindex {}) while the pinned device is in {}",
                        occupant
                            .hw_address
                            .map_or_else(|| "a device without hardware address".into(), |m| m.to_string()),
                        occupant.ifindex,
                        wanted.location
                    ),
                },
                None => ReconcileError::ResourceMissing {
                    interface: iface.to_string(),
                    detail: pin_detail(pin),
                },
            });
        }

        let Some(source) = source else {
            return Err(ReconcileError::ResourceMissing {
                interface: iface.to_string(),
                detail: pin_detail(pin),
            });
        };

        plan.actions.push(PlannedAction {
            action: Action::MoveInterface {
                interface: iface.to_string(),
                from: source.location.clone(),
                namespace: ns.to_string(),
                hw_address: pin,
            },
            predicate: placed,
        });
    }

    let address = *target.address();
    plan.push_unless(
        snapshot,
        Action::AddAddress {
            namespace: ns.to_string(),
            interface: iface.to_string(),
            address,
        },
        Predicate::AddressPresent { address },
    );

    if target.address_policy() == AddressPolicy::Exclusive {
        for stale in snapshot.addresses() {
            if *stale == address || stale.is_ipv6_link_local() {
                continue;
            }
            plan.push_unless(
                snapshot,
                Action::RemoveAddress {
                    namespace: ns.to_string(),
                    interface: iface.to_string(),
                    address: *stale,
                },
                Predicate::AddressAbsent { address: *stale },
            );
        }
    }

    if target.bring_up() {
        for link in [iface, "lo"] {
            plan.push_unless(
                snapshot,
                Action::SetLinkUp {
                    namespace: ns.to_string(),
                    interface: link.to_string(),
                },
                Predicate::LinkUp {
                    interface: link.to_string(),
                },
            );
        }
    }

    if let Some(gateway) = target.gateway() {
        plan.push_unless(
            snapshot,
            Action::AddDefaultRoute {
                namespace: ns.to_string(),
                interface: iface.to_string(),
                gateway,
                onlink: target.gateway_onlink(),
            },
            Predicate::DefaultRoutePresent {
                family: family_of(&gateway),
            },
        );
    }

    Ok(plan)
}

fn pin_detail(pin: Option<MacAddr>) -> String {
    match pin {
        Some(mac) => format!("no device with hardware address {} on this host", mac),
        None => "no such device on this host".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::snapshot::{DefaultRoute, ObservedInterface};

    const INET: u8 = libc::AF_INET as u8;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    fn target() -> NamespaceTarget {
        NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .gateway("10.0.0.1".parse().unwrap())
            .build()
            .unwrap()
    }

    fn at(location: InterfaceLocation) -> ObservedInterface {
        ObservedInterface {
            location,
            ifindex: 2,
            up: false,
            hw_address: None,
        }
    }

    fn in_ns(name: &str) -> InterfaceLocation {
        InterfaceLocation::Namespace(name.to_string())
    }

    fn converged() -> NamespaceSnapshot {
        NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.2/24"))
            .with_default_route(DefaultRoute {
                family: INET,
                gateway: Some("10.0.0.1".parse().unwrap()),
                oif: Some(2),
            })
    }

    #[test]
    fn test_empty_host_plans_everything_in_order() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1").with_interface(at(InterfaceLocation::Host));
        let plan = plan(&target(), &snap).unwrap();

        assert_eq!(
            plan.kinds(),
            vec![
                ActionKind::CreateNamespace,
                ActionKind::MoveInterface,
                ActionKind::AddAddress,
                ActionKind::AddDefaultRoute,
            ]
        );
        assert!(matches!(
            &plan.actions()[1].action,
            Action::MoveInterface { from: InterfaceLocation::Host, .. }
        ));
    }

    #[test]
    fn test_converged_plans_nothing() {
        let plan = plan(&target(), &converged()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.summary(), "No changes needed");
    }

    #[test]
    fn test_interface_in_other_namespace() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns2")));
        let plan = plan(&target(), &snap).unwrap();

        assert_eq!(
            plan.kinds(),
            vec![
                ActionKind::MoveInterface,
                ActionKind::AddAddress,
                ActionKind::AddDefaultRoute,
            ]
        );
        assert!(matches!(
            &plan.actions()[0].action,
            Action::MoveInterface { from: InterfaceLocation::Namespace(n), .. } if n == "ns2"
        ));
    }

    #[test]
    fn test_placed_interface_never_moved() {
        // Whatever else is missing, a placed interface stays put.
        let snaps = [
            NamespaceSnapshot::absent("ns1", "eth1")
                .with_namespace()
                .with_interface(at(in_ns("ns1"))),
            NamespaceSnapshot::absent("ns1", "eth1")
                .with_namespace()
                .with_interface(at(in_ns("ns1")))
                .with_interface(at(InterfaceLocation::Host)),
            NamespaceSnapshot::absent("ns1", "eth1")
                .with_namespace()
                .with_interface(at(in_ns("ns1")))
                .with_address(cidr("192.168.1.5/24")),
        ];

        for snap in &snaps {
            let plan = plan(&target(), snap).unwrap();
            assert!(!plan.kinds().contains(&ActionKind::MoveInterface));
        }
    }

    #[test]
    fn test_additive_addressing() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.9/24"));
        let plan = plan(&target(), &snap).unwrap();

        assert!(plan.actions().iter().any(|p| matches!(
            &p.action,
            Action::AddAddress { address, .. } if *address == cidr("10.0.0.2/24")
        )));
        assert!(!plan.kinds().contains(&ActionKind::RemoveAddress));
    }

    #[test]
    fn test_exclusive_addressing_removes_after_add() {
        let target = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .address_policy(AddressPolicy::Exclusive)
            .build()
            .unwrap();
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.9/24"))
            .with_address(cidr("fe80::1/64"));
        let plan = plan(&target, &snap).unwrap();

        assert_eq!(
            plan.kinds(),
            vec![ActionKind::AddAddress, ActionKind::RemoveAddress]
        );
        assert!(matches!(
            &plan.actions()[1].action,
            Action::RemoveAddress { address, .. } if *address == cidr("10.0.0.9/24")
        ));
    }

    #[test]
    fn test_any_default_route_satisfies() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.2/24"))
            .with_default_route(DefaultRoute {
                family: INET,
                gateway: Some("10.0.0.254".parse().unwrap()),
                oif: Some(2),
            });
        assert!(plan(&target(), &snap).unwrap().is_empty());

        // An IPv6 default does not count for an IPv4 gateway.
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.2/24"))
            .with_default_route(DefaultRoute {
                family: libc::AF_INET6 as u8,
                gateway: None,
                oif: Some(2),
            });
        assert_eq!(
            plan(&target(), &snap).unwrap().kinds(),
            vec![ActionKind::AddDefaultRoute]
        );
    }

    #[test]
    fn test_bring_up_links() {
        let target = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .bring_up(true)
            .build()
            .unwrap();
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_address(cidr("10.0.0.2/24"))
            .with_loopback(true);
        let plan = plan(&target, &snap).unwrap();

        assert_eq!(plan.len(), 1);
        assert!(matches!(
            &plan.actions()[0].action,
            Action::SetLinkUp { interface, .. } if interface == "eth1"
        ));
    }

    #[test]
    fn test_missing_interface() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1").with_namespace();
        let err = plan(&target(), &snap).unwrap_err();
        assert!(matches!(err, ReconcileError::ResourceMissing { .. }));
    }

    #[test]
    fn test_pin_conflict() {
        let mac: MacAddr = "02:00:00:00:00:01".parse().unwrap();
        let target = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .hw_address(Some(mac))
            .build()
            .unwrap();

        let mut wanted = at(InterfaceLocation::Host);
        wanted.hw_address = Some(mac);
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")))
            .with_interface(wanted);

        let err = plan(&target, &snap).unwrap_err();
        assert!(matches!(err, ReconcileError::NamingConflict { .. }));

        // Without the pinned device anywhere it is simply missing.
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_namespace()
            .with_interface(at(in_ns("ns1")));
        let err = plan(&target, &snap).unwrap_err();
        assert!(matches!(err, ReconcileError::ResourceMissing { .. }));
    }

    #[test]
    fn test_pin_selects_source() {
        let mac: MacAddr = "02:00:00:00:00:01".parse().unwrap();
        let target = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .hw_address(Some(mac))
            .build()
            .unwrap();

        let mut wanted = at(in_ns("ns2"));
        wanted.hw_address = Some(mac);
        let snap = NamespaceSnapshot::absent("ns1", "eth1")
            .with_interface(at(InterfaceLocation::Host))
            .with_interface(wanted);

        let plan = plan(&target, &snap).unwrap();
        assert!(matches!(
            &plan.actions()[1].action,
            Action::MoveInterface { from: InterfaceLocation::Namespace(n), .. } if n == "ns2"
        ));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1").with_interface(at(InterfaceLocation::Host));
        assert_eq!(plan(&target(), &snap).unwrap(), plan(&target(), &snap).unwrap());
    }

    #[test]
    fn test_summary_lines() {
        let snap = NamespaceSnapshot::absent("ns1", "eth1").with_interface(at(InterfaceLocation::Host));
        let summary = plan(&target(), &snap).unwrap().summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "+ netns ns1");
        assert_eq!(lines[1], "~ link eth1 (host -> netns ns1)");
        assert_eq!(lines[2], "+ address 10.0.0.2/24 on eth1");
        assert_eq!(lines[3], "+ route default via 10.0.0.1 dev eth1");
    }
}
