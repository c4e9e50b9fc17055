//! Kernel integration tests.
//!
//! Interfaces are veth ends created inside throwaway namespaces, so nothing
//! on the host itself is touched.

use std::fs;

use netns_keeper::Result;
use netns_keeper::netlink::namespace;
use netns_keeper::reconcile::{
    ActionKind, InterfaceLocation, NamespaceTarget, NetlinkExecutor, NetlinkInspector,
    StateInspector, run_pass, teardown,
};

use crate::common::{TestNamespace, unique_ifname};

#[tokio::test]
async fn test_namespace_create_and_delete() -> Result<()> {
    require_root!();

    let ns = TestNamespace::reserve("lifecycle");
    assert!(!namespace::exists(ns.name()));

    namespace::create(ns.name())?;
    assert!(namespace::exists(ns.name()));
    assert!(namespace::list()?.iter().any(|n| n == ns.name()));

    let err = namespace::create(ns.name()).unwrap_err();
    assert!(err.is_already_exists());

    // A fresh namespace holds only a down loopback.
    let conn = namespace::connection_for(ns.name())?;
    let links = conn.get_links().await?;
    assert_eq!(links.len(), 1);
    assert!(links[0].is_loopback());
    assert!(!links[0].is_up());

    assert!(teardown(ns.name())?);
    assert!(!namespace::exists(ns.name()));
    assert!(!teardown(ns.name())?);
    Ok(())
}

#[tokio::test]
async fn test_inspect_finds_interface_in_other_namespace() -> Result<()> {
    require_root!();

    let source = TestNamespace::new("src")?;
    let iface = unique_ifname();
    source.add_veth(&iface);

    let target = TestNamespace::reserve("dst");
    let snap = NetlinkInspector::new().inspect(target.name(), &iface).await?;

    assert!(!snap.namespace_exists());
    assert!(snap.placed().is_none());
    let found: Vec<_> = snap.elsewhere().collect();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].location,
        InterfaceLocation::Namespace(source.name().to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_pass_moves_addresses_and_routes() -> Result<()> {
    require_root!();

    let source = TestNamespace::new("src")?;
    let iface = unique_ifname();
    source.add_veth(&iface);

    let dst = TestNamespace::reserve("dst");
    let target = NamespaceTarget::builder(dst.name(), iface.as_str(), "10.77.0.2/24".parse().unwrap())
        .gateway("10.77.0.1".parse().unwrap())
        .bring_up(true)
        .build()
        .unwrap();

    let inspector = NetlinkInspector::new();
    let executor = NetlinkExecutor::new();

    let pass = run_pass(&target, &inspector, &executor).await.unwrap();
    assert!(pass.is_converged(), "{}", pass.report.summary());
    assert_eq!(
        pass.plan.kinds(),
        vec![
            ActionKind::CreateNamespace,
            ActionKind::MoveInterface,
            ActionKind::AddAddress,
            ActionKind::SetLinkUp,
            ActionKind::SetLinkUp,
            ActionKind::AddDefaultRoute,
        ]
    );

    let snap = inspector.inspect(dst.name(), &iface).await?;
    assert!(snap.placed().is_some_and(|i| i.up));
    assert!(snap.has_address(target.address()));
    assert!(snap.has_default_route(libc::AF_INET as u8));
    assert_eq!(snap.loopback_up(), Some(true));

    // Second pass is a no-op.
    let again = run_pass(&target, &inspector, &executor).await.unwrap();
    assert!(again.was_noop(), "{}", again.plan.summary());
    Ok(())
}

#[tokio::test]
async fn test_create_reuses_leftover_file() -> Result<()> {
    require_root!();

    let ns = TestNamespace::reserve("leftover");
    fs::create_dir_all(namespace::NETNS_RUN_DIR)?;
    fs::write(namespace::path_for(ns.name()), b"")?;
    assert!(!namespace::is_mounted(&namespace::path_for(ns.name())));

    namespace::create(ns.name())?;
    assert!(namespace::is_mounted(&namespace::path_for(ns.name())));
    let links = namespace::connection_for(ns.name())?.get_links().await?;
    assert!(links.iter().any(|l| l.is_loopback()));
    Ok(())
}

#[tokio::test]
async fn test_pass_recovers_from_interrupted_create() -> Result<()> {
    require_root!();

    let source = TestNamespace::new("src")?;
    let iface = unique_ifname();
    source.add_veth(&iface);

    // What an interrupted create leaves: the file, but no mount.
    let dst = TestNamespace::reserve("dst");
    fs::create_dir_all(namespace::NETNS_RUN_DIR)?;
    fs::write(namespace::path_for(dst.name()), b"")?;

    let target = NamespaceTarget::builder(dst.name(), iface.as_str(), "10.78.0.2/24".parse().unwrap())
        .build()
        .unwrap();
    let inspector = NetlinkInspector::new();
    let executor = NetlinkExecutor::new();

    let snap = inspector.inspect(dst.name(), &iface).await?;
    assert!(!snap.namespace_exists());

    let pass = run_pass(&target, &inspector, &executor).await.unwrap();
    assert!(pass.is_converged(), "{}", pass.report.summary());
    assert_eq!(
        pass.plan.kinds(),
        vec![
            ActionKind::CreateNamespace,
            ActionKind::MoveInterface,
            ActionKind::AddAddress,
        ]
    );

    let again = run_pass(&target, &inspector, &executor).await.unwrap();
    assert!(again.was_noop(), "{}", again.plan.summary());
    Ok(())
}
