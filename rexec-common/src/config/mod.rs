mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
use serde::{Deserialize, Serialize};

use crate::ListenEndpoint;

/// What happens to a still-running process when the peer closes its channel.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq, Copy)]
pub enum ChannelClosePolicy {
    #[serde(rename = "keep_running")]
    #[default]
    KeepRunning,
    /// Deliver SIGHUP to the process.
    #[serde(rename = "hangup")]
    Hangup,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SshConfig {
    #[serde(default = "_default_ssh_listen")]
    pub listen: ListenEndpoint,

    #[serde(default = "_default_ssh_keys_path")]
    pub keys: String,

    #[serde(default, with = "humantime_serde::option")]
    pub inactivity_timeout: Option<Duration>,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            listen: _default_ssh_listen(),
            keys: _default_ssh_keys_path(),
            inactivity_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecConfig {
    /// Interpreter used to run requested commands.
    #[serde(default = "_default_shell")]
    pub shell: String,

    /// Arguments placed between the interpreter and the command text.
    #[serde(default = "_default_shell_args")]
    pub shell_args: Vec<String>,

    #[serde(default)]
    pub on_channel_close: ChannelClosePolicy,
}

impl Default for ExecConfig {
    fn default() -> Self {
        ExecConfig {
            shell: _default_shell(),
            shell_args: _default_shell_args(),
            on_channel_close: ChannelClosePolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "_default_client_host")]
    pub host: String,

    #[serde(default = "_default_client_port")]
    pub port: u16,

    #[serde(default = "_default_client_user")]
    pub user: String,

    /// Private key used for authentication. Generated under `ssh.keys` when unset.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: _default_client_host(),
            port: _default_client_port(),
            user: _default_client_user(),
            key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RexecConfigStore {
    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub exec: ExecConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone)]
pub struct RexecConfig {
    pub store: RexecConfigStore,
    pub paths_relative_to: PathBuf,
}

impl RexecConfig {
    pub fn keys_path(&self) -> PathBuf {
        self.resolve_path(&self.store.ssh.keys)
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let mut resolved = self.paths_relative_to.clone();
        resolved.push(path);
        resolved
    }
}
