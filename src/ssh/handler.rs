//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to handle SSH connection
//! events. Server keys are verified against the host trust registry:
//! accepted and pinned on first contact, refused on any later mismatch.

use std::sync::Arc;

use ssh_key::HashAlg;
use tracing::debug;

use crate::error::CoreError;
use crate::trust::HostTrustRegistry;

/// SSH client handler wiring host key verification into the TOFU registry
pub struct ClientHandler {
    host: String,
    trust: Arc<HostTrustRegistry>,
}

impl ClientHandler {
    /// Create a handler verifying keys presented by `host`
    pub fn new(host: impl Into<String>, trust: Arc<HostTrustRegistry>) -> Self {
        Self {
            host: host.into(),
            trust,
        }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = CoreError;

    /// Verify the server's host key against the pinned fingerprint.
    ///
    /// A mismatch aborts the handshake with `HostKeyMismatch` before
    /// authentication, so no credential is ever presented to an imposter.
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        debug!(host = %self.host, %fingerprint, "verifying server key");

        self.trust.verify(&self.host, &fingerprint)?;
        Ok(true)
    }
}
