use russh::keys::{HashAlg, PublicKey};
use tracing::*;

use super::error::SshClientError;

pub struct ClientHandler {
    pub host: String,
    pub port: u16,
}

impl russh::client::Handler for ClientHandler {
    type Error = SshClientError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host key verification is not implemented, every key is trusted.
        warn!(
            host=%self.host,
            port=self.port,
            fingerprint=%server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting unverified host key"
        );
        Ok(true)
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        debug!(host=%self.host, "Dropped");
    }
}
