//! Plain-text response envelope.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// Address and name of the pod, printed in every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub address: IpAddr,
    pub hostname: String,
}

impl HostInfo {
    /// Resolve the local hostname once at startup.
    ///
    /// Falls back to loopback when the name cannot be resolved.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let address = (hostname.as_str(), 0)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        debug!(%address, %hostname, "host info resolved");
        Self { address, hostname }
    }

    fn label(&self) -> String {
        format!("{:<15} {:>15}", self.address.to_string(), self.hostname)
    }
}

/// Render `message` as `<status> [<host>] <message>` with a matching status code.
pub fn reply(host: &HostInfo, status: StatusCode, message: impl std::fmt::Display) -> Response {
    let body = format!("{:>3} [{}] {}", status.as_u16(), host.label(), message);
    (status, body).into_response()
}
