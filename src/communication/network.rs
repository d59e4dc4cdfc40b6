use std::net::UdpSocket;

use super::NetworkLink;

/// Treats the link as up when the OS can route to `target` from a
/// non-loopback local address. No packet is sent.
#[derive(Debug, Clone)]
pub struct RouteProbe {
    target: String,
}

impl RouteProbe {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl NetworkLink for RouteProbe {
    fn link_up(&mut self) -> bool {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(socket) => socket,
            Err(e) => {
                tracing::debug!("Route probe bind failed: {}", e);
                return false;
            }
        };
        if let Err(e) = socket.connect(self.target.as_str()) {
            tracing::debug!("No route to {}: {}", self.target, e);
            return false;
        }
        match socket.local_addr() {
            Ok(addr) => !addr.ip().is_unspecified() && !addr.ip().is_loopback(),
            Err(_) => false,
        }
    }
}

/// Fixed link state, for tests and bench setups without a network.
#[derive(Debug, Clone, Copy)]
pub struct StaticLink(pub bool);

impl NetworkLink for StaticLink {
    fn link_up(&mut self) -> bool {
        self.0
    }
}
