//! SSH connection establishment and command execution
//!
//! Production implementation of the [`Connector`]/[`Transport`] seams on top
//! of russh. Connections are established lazily by the pool, authenticate
//! with the credential store's effective secrets (private key first, login
//! password second), and verify host identity through the TOFU registry
//! during the handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::ChannelMsg;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialKind, CredentialStore};
use crate::error::{CoreError, Result};
use crate::trust::HostTrustRegistry;

use super::handler::ClientHandler;
use super::host::HostSpec;
use super::transport::{CommandOutput, Connector, Transport};

/// Connector producing authenticated russh sessions
pub struct SshConnector {
    credentials: Arc<CredentialStore>,
    trust: Arc<HostTrustRegistry>,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(
        credentials: Arc<CredentialStore>,
        trust: Arc<HostTrustRegistry>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            trust,
            connect_timeout,
        }
    }

    async fn do_connect(&self, host: &HostSpec) -> Result<Handle<ClientHandler>> {
        info!(host = %host.name, endpoint = %host.endpoint(), "connecting");

        let ssh_config = Arc::new(client::Config::default());
        let handler = ClientHandler::new(&host.name, self.trust.clone());

        // Handshake errors surface as the handler's error type, so a TOFU
        // mismatch arrives here as HostKeyMismatch, not a generic failure.
        let endpoint = host.endpoint();
        let mut session = match timeout(
            self.connect_timeout,
            client::connect(ssh_config, endpoint.as_str(), handler),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(host = %host.name, "connection timed out");
                return Err(CoreError::Timeout(self.connect_timeout.as_millis() as u64));
            }
        };

        self.authenticate(host, &mut session).await?;

        info!(host = %host.name, user = %host.username, "connected");
        Ok(session)
    }

    /// Authenticate with the effective credentials for this host.
    ///
    /// Private key takes precedence over login password; with neither
    /// configured the connection fails before anything is sent.
    async fn authenticate(&self, host: &HostSpec, session: &mut Handle<ClientHandler>) -> Result<()> {
        if let Some(key_content) = self
            .credentials
            .resolve(CredentialKind::PrivateKey, &host.name)?
        {
            debug!(host = %host.name, user = %host.username, "attempting key authentication");

            let key = russh::keys::PrivateKey::from_openssh(key_content.as_bytes())
                .map_err(|e| CoreError::auth(format!("Failed to parse private key: {}", e)))?;
            let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);

            let auth_result = session
                .authenticate_publickey(&host.username, key_with_alg)
                .await
                .map_err(|e| CoreError::auth(e.to_string()))?;

            return if auth_result.success() {
                debug!(host = %host.name, "key authentication successful");
                Ok(())
            } else {
                Err(CoreError::auth("Key authentication rejected"))
            };
        }

        if let Some(password) = self
            .credentials
            .resolve(CredentialKind::LoginPassword, &host.name)?
        {
            debug!(host = %host.name, user = %host.username, "attempting password authentication");

            let auth_result = session
                .authenticate_password(&host.username, password.as_str())
                .await
                .map_err(|e| CoreError::auth(e.to_string()))?;

            return if auth_result.success() {
                debug!(host = %host.name, "password authentication successful");
                Ok(())
            } else {
                Err(CoreError::auth("Password authentication rejected"))
            };
        }

        Err(CoreError::auth(
            "No credential available (require private_key or login_password)",
        ))
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, host: &HostSpec) -> Result<Box<dyn Transport>> {
        let session = self.do_connect(host).await?;
        Ok(Box::new(SshTransport {
            host: host.name.clone(),
            session,
        }))
    }
}

/// One authenticated russh session
pub struct SshTransport {
    host: String,
    session: Handle<ClientHandler>,
}

impl SshTransport {
    async fn open_channel(&self) -> Result<russh::Channel<client::Msg>> {
        self.session
            .channel_open_session()
            .await
            .map_err(|e| CoreError::connection(format!("Failed to open channel: {}", e)))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(&mut self, command: &str, timeout_duration: Duration) -> Result<CommandOutput> {
        let channel = self.open_channel().await?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| CoreError::connection(format!("Failed to exec command: {}", e)))?;

        match timeout(timeout_duration, collect_channel_output(channel)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    host = %self.host,
                    "command timed out after {}ms",
                    timeout_duration.as_millis()
                );
                Err(CoreError::Timeout(timeout_duration.as_millis() as u64))
            }
        }
    }

    async fn probe(&mut self) -> bool {
        match self.session.channel_open_session().await {
            Ok(channel) => {
                let _ = channel.eof().await;
                true
            }
            Err(e) => {
                debug!(host = %self.host, "probe failed: {}", e);
                false
            }
        }
    }

    async fn close(&mut self) {
        let _ = self
            .session
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
        debug!(host = %self.host, "connection closed");
    }
}

/// Collect output from a channel until it closes
async fn collect_channel_output(
    mut channel: russh::Channel<client::Msg>,
) -> Result<CommandOutput> {
    let mut output = CommandOutput::new();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => {
                output.stdout.push_str(&String::from_utf8_lossy(&data));
            }
            ChannelMsg::ExtendedData { data, ext } => {
                // ext == 1 is stderr
                if ext == 1 {
                    output.stderr.push_str(&String::from_utf8_lossy(&data));
                } else {
                    output.stdout.push_str(&String::from_utf8_lossy(&data));
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                output.exit_code = Some(exit_status);
            }
            ChannelMsg::Close | ChannelMsg::Eof => {
                break;
            }
            _ => {
                // Ignore other messages
            }
        }
    }

    debug!(
        "command completed: exit_code={:?}, stdout_len={}, stderr_len={}",
        output.exit_code,
        output.stdout.len(),
        output.stderr.len()
    );

    Ok(output)
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::db::Database;

    #[test]
    fn test_connector_creation() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let audit = Arc::new(AuditLog::new(db.clone()));
        let credentials = Arc::new(CredentialStore::new(db.clone(), Some(b"master")).unwrap());
        let trust = Arc::new(HostTrustRegistry::new(db, audit));

        let connector = SshConnector::new(credentials, trust, Duration::from_secs(5));
        assert_eq!(connector.connect_timeout, Duration::from_secs(5));
    }
}
