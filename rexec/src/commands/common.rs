use anyhow::{Context, Result};
use rexec_common::RexecConfig;
use rexec_protocol_ssh::{ensure_client_key, load_client_key, ClientAuth, RemoteSession};
use tracing::*;

use crate::ConnectArgs;

pub(crate) async fn connect(config: &RexecConfig, args: &ConnectArgs) -> Result<RemoteSession> {
    let client = &config.store.client;
    let host = args.host.as_deref().unwrap_or(&client.host);
    let port = args.port.unwrap_or(client.port);
    let user = args.user.as_deref().unwrap_or(&client.user);

    let auth = match (&args.password, &args.key) {
        (Some(password), _) => ClientAuth::Password(password.clone()),
        (None, Some(key)) => ClientAuth::PublicKey(load_client_key(key)?),
        (None, None) => ClientAuth::PublicKey(load_client_key(&ensure_client_key(config)?)?),
    };

    let session = RemoteSession::connect(host, port, user, auth)
        .await
        .with_context(|| format!("Could not connect to {host}:{port}"))?;
    debug!(%host, port, %user, "Session established");
    Ok(session)
}
