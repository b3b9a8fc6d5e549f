//! Registry advertisement: publish this bridge as a remote session so
//! managers on other hosts can discover it.

use std::net::UdpSocket;

use tracing::{info, warn};

use termlink_core::{Result, SessionDescriptor, SessionRegistry};

/// Best local address to advertise to managers on other hosts.
///
/// Connecting a UDP socket performs route selection without sending a packet;
/// the socket's local address is the interface a remote peer would reach us
/// on. Falls back to loopback when the probe fails.
pub fn advertise_host() -> String {
    let routed = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());
    match routed {
        Ok(host) => host,
        Err(e) => {
            warn!("Route probe failed ({}), advertising loopback", e);
            "127.0.0.1".to_string()
        }
    }
}

/// Write this bridge's descriptor into the registry.
pub fn register(
    registry: &SessionRegistry,
    project: &str,
    host: &str,
    port: u16,
    work_dir: Option<String>,
) -> Result<()> {
    let descriptor = SessionDescriptor::remote(project, host, port, work_dir);
    registry.register(&descriptor)?;
    info!("Registered '{}' as {}:{}", project, host, port);
    Ok(())
}

/// Remove this bridge's descriptor, tolerating a registry that is already
/// gone at shutdown.
pub fn deregister(registry: &SessionRegistry, project: &str) {
    match registry.remove(project) {
        Ok(true) => info!("Deregistered '{}'", project),
        Ok(false) => {}
        Err(e) => warn!("Deregister '{}' failed: {}", project, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termlink_core::TransportKind;

    #[test]
    fn test_register_and_deregister() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(tmp.path());

        register(&registry, "web-app", "10.0.0.5", 50001, Some("/srv/web".to_string())).unwrap();
        let loaded = registry.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].project, "web-app");
        assert_eq!(loaded[0].kind, TransportKind::Remote);
        assert_eq!(loaded[0].endpoint(), "10.0.0.5:50001");

        deregister(&registry, "web-app");
        assert!(registry.load().unwrap().is_empty());
    }

    #[test]
    fn test_deregister_missing_is_quiet() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(tmp.path());
        deregister(&registry, "never-registered");
    }

    #[test]
    fn test_advertise_host_is_an_ip() {
        let host = advertise_host();
        assert!(host.parse::<std::net::IpAddr>().is_ok());
    }
}
