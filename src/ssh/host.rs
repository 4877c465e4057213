//! Target host description
//!
//! Host registration itself lives outside this core; callers hand the
//! executor a `HostSpec` resolved from their own inventory.

/// Connection coordinates for one monitored host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Stable identifier used for credential scoping, trust pinning, and audit
    pub name: String,

    /// Hostname or IP address to dial (defaults to `name`)
    pub addr: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Username for authentication
    pub username: String,
}

impl HostSpec {
    /// Create a host spec with the default port, dialing `name` directly
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            addr: name.clone(),
            name,
            port: 22,
            username: username.into(),
        }
    }

    /// Dial a different address than the host identifier
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The `addr:port` endpoint to dial
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_spec_builder() {
        let host = HostSpec::new("pve-1", "root")
            .with_addr("192.168.1.10")
            .with_port(2222);

        assert_eq!(host.name, "pve-1");
        assert_eq!(host.addr, "192.168.1.10");
        assert_eq!(host.username, "root");
        assert_eq!(host.endpoint(), "192.168.1.10:2222");
    }

    #[test]
    fn test_addr_defaults_to_name() {
        let host = HostSpec::new("nas.local", "admin");
        assert_eq!(host.endpoint(), "nas.local:22");
    }
}
