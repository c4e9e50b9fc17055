//! The declared end state of one namespace.

use std::net::IpAddr;

use super::ReconcileError;
use crate::util::{Cidr, MacAddr, ifname};

/// What to do with addresses on the interface other than the declared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AddressPolicy {
    /// Leave them alone.
    #[default]
    Additive,
    /// Remove them once the declared address is in place. IPv6 link-local
    /// addresses are never removed.
    Exclusive,
}

/// Desired state of a namespace: which interface it holds and how that
/// interface is addressed and routed.
///
/// Constructed through [`NamespaceTarget::builder`], which validates every
/// field, so a value of this type is always usable as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NamespaceTarget {
    namespace: String,
    interface: String,
    address: Cidr,
    gateway: Option<IpAddr>,
    gateway_onlink: bool,
    hw_address: Option<MacAddr>,
    address_policy: AddressPolicy,
    bring_up: bool,
}

impl NamespaceTarget {
    /// Start building a target.
    pub fn builder(
        namespace: impl Into<String>,
        interface: impl Into<String>,
        address: Cidr,
    ) -> NamespaceTargetBuilder {
        NamespaceTargetBuilder {
            target: NamespaceTarget {
                namespace: namespace.into(),
                interface: interface.into(),
                address,
                gateway: None,
                gateway_onlink: false,
                hw_address: None,
                address_policy: AddressPolicy::default(),
                bring_up: false,
            },
        }
    }

    /// Namespace name.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Address to carry on the interface.
    pub fn address(&self) -> &Cidr {
        &self.address
    }

    /// Default gateway, if any.
    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    /// Whether the gateway is installed with the on-link flag.
    pub fn gateway_onlink(&self) -> bool {
        self.gateway_onlink
    }

    /// Hardware address the interface must have, if pinned.
    pub fn hw_address(&self) -> Option<MacAddr> {
        self.hw_address
    }

    /// Policy for addresses other than the declared one.
    pub fn address_policy(&self) -> AddressPolicy {
        self.address_policy
    }

    /// Whether the interface and loopback are set administratively up.
    pub fn bring_up(&self) -> bool {
        self.bring_up
    }
}

/// Builder for [`NamespaceTarget`].
#[derive(Debug, Clone)]
#[must_use]
pub struct NamespaceTargetBuilder {
    target: NamespaceTarget,
}

impl NamespaceTargetBuilder {
    /// Install a default route via `gateway`.
    pub fn gateway(mut self, gateway: IpAddr) -> Self {
        self.target.gateway = Some(gateway);
        self
    }

    /// Set the optional gateway.
    pub fn gateway_opt(mut self, gateway: Option<IpAddr>) -> Self {
        self.target.gateway = gateway;
        self
    }

    /// Allow a gateway outside the interface prefix (route gets the on-link flag).
    pub fn gateway_onlink(mut self, onlink: bool) -> Self {
        self.target.gateway_onlink = onlink;
        self
    }

    /// Only accept the interface if it carries this hardware address.
    pub fn hw_address(mut self, mac: Option<MacAddr>) -> Self {
        self.target.hw_address = mac;
        self
    }

    /// Set the address policy.
    pub fn address_policy(mut self, policy: AddressPolicy) -> Self {
        self.target.address_policy = policy;
        self
    }

    /// Set the interface and loopback up as part of each pass.
    pub fn bring_up(mut self, up: bool) -> Self {
        self.target.bring_up = up;
        self
    }

    /// Validate and return the target.
    pub fn build(self) -> Result<NamespaceTarget, ReconcileError> {
        let target = self.target;

        ifname::validate_namespace(&target.namespace)
            .map_err(|e| ReconcileError::InvalidTarget(e.to_string()))?;
        ifname::validate(&target.interface)
            .map_err(|e| ReconcileError::InvalidTarget(e.to_string()))?;

        if target.interface == "lo" {
            return Err(ReconcileError::InvalidTarget(
                "the loopback interface cannot be moved between namespaces".into(),
            ));
        }

        if target.address.addr().is_unspecified() || target.address.addr().is_multicast() {
            return Err(ReconcileError::InvalidTarget(format!(
                "{} is not a usable interface address",
                target.address
            )));
        }

        if let Some(gateway) = target.gateway {
            if gateway.is_ipv4() != target.address.addr().is_ipv4() {
                return Err(ReconcileError::InvalidTarget(format!(
                    "gateway {} and address {} are different address families",
                    gateway, target.address
                )));
            }
            if gateway == target.address.addr() {
                return Err(ReconcileError::InvalidTarget(format!(
                    "gateway {} is the interface's own address",
                    gateway
                )));
            }
            if !target.gateway_onlink && !target.address.contains(&gateway) {
                return Err(ReconcileError::InvalidTarget(format!(
                    "gateway {} is outside {} (mark it on-link to allow this)",
                    gateway, target.address
                )));
            }
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_minimal() {
        let t = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .build()
            .unwrap();
        assert_eq!(t.namespace(), "ns1");
        assert_eq!(t.interface(), "eth1");
        assert_eq!(t.gateway(), None);
        assert_eq!(t.address_policy(), AddressPolicy::Additive);
        assert!(!t.bring_up());
    }

    #[test]
    fn test_rejects_bad_names() {
        let err = NamespaceTarget::builder("", "eth1", cidr("10.0.0.2/24"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidTarget(_)));

        assert!(
            NamespaceTarget::builder("ns1", "much-too-long-name0", cidr("10.0.0.2/24"))
                .build()
                .is_err()
        );
        assert!(
            NamespaceTarget::builder("ns1", "lo", cidr("10.0.0.2/24"))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_gateway_must_be_in_prefix() {
        let err = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .gateway("10.0.1.1".parse().unwrap())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("outside"));

        let t = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .gateway("10.0.1.1".parse().unwrap())
            .gateway_onlink(true)
            .build()
            .unwrap();
        assert!(t.gateway_onlink());
    }

    #[test]
    fn test_gateway_family_and_self() {
        assert!(
            NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
                .gateway("fd00::1".parse().unwrap())
                .gateway_onlink(true)
                .build()
                .is_err()
        );
        assert!(
            NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
                .gateway("10.0.0.2".parse().unwrap())
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_rejects_unusable_address() {
        assert!(
            NamespaceTarget::builder("ns1", "eth1", cidr("0.0.0.0/0"))
                .build()
                .is_err()
        );
        assert!(
            NamespaceTarget::builder("ns1", "eth1", cidr("224.0.0.1/4"))
                .build()
                .is_err()
        );
    }
}
