use std::collections::HashMap;
use std::net::SocketAddr;

/// A node of the cluster, as known to the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Host {
    pub address: SocketAddr,
    /// Release version reported by the node itself, e.g. `"3.11.4"`.
    pub release_version: Option<String>,
}

impl Host {
    pub fn new(address: SocketAddr, release_version: Option<String>) -> Self {
        Self {
            address,
            release_version,
        }
    }
}

/// Cluster membership, as seen by the driver.
///
/// Used by [VersionDispatcher](super::dispatcher::VersionDispatcher) to find
/// out which server generation a connection talks to.
pub trait ClusterRegistry: Send + Sync {
    /// Returns the host with given address, if known.
    fn host_for(&self, address: SocketAddr) -> Option<Host>;

    /// Returns all known hosts.
    fn hosts(&self) -> Vec<Host>;
}

impl ClusterRegistry for HashMap<SocketAddr, Host> {
    fn host_for(&self, address: SocketAddr) -> Option<Host> {
        self.get(&address).cloned()
    }

    fn hosts(&self) -> Vec<Host> {
        self.values().cloned().collect()
    }
}
