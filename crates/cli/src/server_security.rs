use anyhow::{Context as AnyhowContext, Result};
use std::net::SocketAddr;

/// Where `serve-http` will listen, after the loopback check.
#[derive(Debug, Clone)]
pub(crate) struct BindTarget {
    pub addrs: Vec<SocketAddr>,
    /// Resolved addresses reachable from other hosts.
    pub exposed: Vec<SocketAddr>,
}

/// Resolve `bind` and refuse to expose the staging API unless `public` is set.
///
/// Anyone who reaches the API can rewrite sidecars under the dataset root.
pub(crate) async fn guard_bind(bind: &str, public: bool) -> Result<BindTarget> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();
    if addrs.is_empty() {
        anyhow::bail!("Bind address {bind} resolved to nothing");
    }
    check_exposure(bind, addrs, public)
}

fn check_exposure(bind: &str, addrs: Vec<SocketAddr>, public: bool) -> Result<BindTarget> {
    let exposed: Vec<SocketAddr> = addrs
        .iter()
        .copied()
        .filter(|addr| !addr.ip().is_loopback())
        .collect();
    if !exposed.is_empty() && !public {
        anyhow::bail!(
            "Refusing to bind to non-loopback address without --public: {bind}. \
             The tag staging API can overwrite sidecar files and has no authentication."
        );
    }
    if !exposed.is_empty() {
        log::warn!("Staging API reachable from other hosts on {}", join_addrs(&exposed));
    }
    Ok(BindTarget { addrs, exposed })
}

pub(crate) fn join_addrs(addrs: &[SocketAddr]) -> String {
    addrs
        .iter()
        .map(SocketAddr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
