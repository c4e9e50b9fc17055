//! Whole passes against the in-memory host.

use netns_keeper::Result;
use netns_keeper::reconcile::memory::MemoryHost;
use netns_keeper::reconcile::{
    ActionKind, AddressPolicy, InterfaceLocation, NamespaceTarget, Outcome, ReconcileError,
    StateInspector, plan, run_pass,
};
use netns_keeper::util::{Cidr, MacAddr};

fn cidr(s: &str) -> Cidr {
    s.parse().unwrap()
}

fn target() -> NamespaceTarget {
    NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
        .gateway("10.0.0.1".parse().unwrap())
        .build()
        .unwrap()
}

/// Starting points covering every placement and partial configuration.
fn starting_hosts() -> Vec<(&'static str, MemoryHost)> {
    let partial = MemoryHost::new().with_interface_in("ns1", "eth1", None);
    partial.add_address("ns1", "eth1", cidr("10.0.0.2/24"));

    let foreign_route = MemoryHost::new().with_interface_in("ns1", "eth1", None);
    foreign_route.add_route("ns1", "10.0.0.254".parse().unwrap());

    let other_addr = MemoryHost::new().with_interface_in("ns1", "eth1", None);
    other_addr.add_address("ns1", "eth1", cidr("192.168.5.5/24"));

    let empty_ns = MemoryHost::new().with_host_interface("eth1", None);
    empty_ns.create_namespace("ns1");

    vec![
        ("empty host", MemoryHost::new().with_host_interface("eth1", None)),
        ("namespace exists", empty_ns),
        ("in other namespace", MemoryHost::new().with_interface_in("ns2", "eth1", None)),
        ("placed, unaddressed", MemoryHost::new().with_interface_in("ns1", "eth1", None)),
        ("placed, addressed", partial),
        ("foreign default route", foreign_route),
        ("other address", other_addr),
    ]
}

#[tokio::test]
async fn test_every_start_converges_to_fixed_point() -> Result<()> {
    let targets = [
        target(),
        NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
            .gateway("10.0.0.1".parse().unwrap())
            .bring_up(true)
            .address_policy(AddressPolicy::Exclusive)
            .build()
            .unwrap(),
    ];

    for t in &targets {
        for (name, host) in starting_hosts() {
            let first = run_pass(t, &host, &host).await.unwrap();
            assert!(first.is_converged(), "{}: {}", name, first.report.summary());
            assert!(
                first.plan.kinds().is_sorted(),
                "{}: out of order: {:?}",
                name,
                first.plan.kinds()
            );

            let after = host.inspect("ns1", "eth1").await?;
            assert!(plan(t, &after).unwrap().is_empty(), "{}: not a fixed point", name);

            let executed = host.executed().len();
            let second = run_pass(t, &host, &host).await.unwrap();
            assert!(second.was_noop(), "{}", name);
            assert_eq!(host.executed().len(), executed, "{}: second pass mutated", name);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_empty_host_scenario() -> Result<()> {
    let host = MemoryHost::new().with_host_interface("eth1", None);
    let pass = run_pass(&target(), &host, &host).await.unwrap();

    assert_eq!(
        pass.plan.kinds(),
        vec![
            ActionKind::CreateNamespace,
            ActionKind::MoveInterface,
            ActionKind::AddAddress,
            ActionKind::AddDefaultRoute,
        ]
    );
    assert_eq!(
        host.locations_of("eth1"),
        vec![InterfaceLocation::Namespace("ns1".into())]
    );
    Ok(())
}

#[tokio::test]
async fn test_converged_scenario() -> Result<()> {
    let host = MemoryHost::new().with_interface_in("ns1", "eth1", None);
    host.add_address("ns1", "eth1", cidr("10.0.0.2/24"));
    host.add_route("ns1", "10.0.0.1".parse().unwrap());

    let pass = run_pass(&target(), &host, &host).await.unwrap();
    assert!(pass.was_noop());
    assert!(host.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_other_namespace_scenario() -> Result<()> {
    let host = MemoryHost::new().with_interface_in("ns2", "eth1", None);
    host.create_namespace("ns1");

    let pass = run_pass(&target(), &host, &host).await.unwrap();
    assert_eq!(
        pass.plan.kinds(),
        vec![
            ActionKind::MoveInterface,
            ActionKind::AddAddress,
            ActionKind::AddDefaultRoute,
        ]
    );
    assert!(pass.is_converged());
    Ok(())
}

#[tokio::test]
async fn test_additive_keeps_operator_address() -> Result<()> {
    let host = MemoryHost::new().with_interface_in("ns1", "eth1", None);
    host.add_address("ns1", "eth1", cidr("192.168.5.5/24"));

    run_pass(&target(), &host, &host).await.unwrap();

    let snap = host.inspect("ns1", "eth1").await?;
    assert!(snap.has_address(&cidr("192.168.5.5/24")));
    assert!(snap.has_address(&cidr("10.0.0.2/24")));
    assert!(
        !host
            .executed()
            .iter()
            .any(|a| a.kind() == ActionKind::RemoveAddress)
    );
    Ok(())
}

#[tokio::test]
async fn test_failure_at_every_step() -> Result<()> {
    let kinds = [
        ActionKind::CreateNamespace,
        ActionKind::MoveInterface,
        ActionKind::AddAddress,
        ActionKind::AddDefaultRoute,
    ];

    for (k, kind) in kinds.iter().enumerate() {
        let host = MemoryHost::new()
            .with_host_interface("eth1", None)
            .fail_on(*kind);
        let pass = run_pass(&target(), &host, &host).await.unwrap();
        let results = &pass.report.results;

        assert_eq!(results.len(), 4);
        assert!(results[..k].iter().all(|r| r.outcome == Outcome::Applied));
        assert!(matches!(results[k].outcome, Outcome::Failed(_)));
        assert!(results[k + 1..].iter().all(|r| r.outcome == Outcome::NotAttempted));
        assert_eq!(host.executed().len(), k);
    }
    Ok(())
}

#[tokio::test]
async fn test_pinned_interface_picked_among_duplicates() -> Result<()> {
    let mac: MacAddr = "02:00:00:00:00:07".parse().unwrap();
    let host = MemoryHost::new()
        .with_host_interface("eth1", None)
        .with_interface_in("ns2", "eth1", Some(mac));

    let t = NamespaceTarget::builder("ns1", "eth1", cidr("10.0.0.2/24"))
        .hw_address(Some(mac))
        .build()
        .unwrap();

    let pass = run_pass(&t, &host, &host).await.unwrap();
    assert!(pass.is_converged());

    let mut locations = host.locations_of("eth1");
    locations.sort_by_key(|l| l.to_string());
    assert_eq!(
        locations,
        vec![InterfaceLocation::Host, InterfaceLocation::Namespace("ns1".into())]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_interface_is_reported() -> Result<()> {
    let host = MemoryHost::new().with_interface_in("ns2", "eth9", None);
    let err = run_pass(&target(), &host, &host).await.unwrap_err();
    assert!(matches!(err, ReconcileError::ResourceMissing { .. }));
    assert!(host.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pass_after_teardown_rebuilds() -> Result<()> {
    let host = MemoryHost::new().with_host_interface("eth1", None);
    run_pass(&target(), &host, &host).await.unwrap();

    assert!(host.delete_namespace("ns1"));
    let pass = run_pass(&target(), &host, &host).await.unwrap();
    assert!(pass.is_converged());
    assert_eq!(pass.report.applied(), 4);
    Ok(())
}
