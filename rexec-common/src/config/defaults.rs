use std::net::{Ipv4Addr, SocketAddr};

use crate::ListenEndpoint;

pub(crate) const DEFAULT_SSH_PORT: u16 = 2222;

#[inline]
pub(crate) fn _default_ssh_listen() -> ListenEndpoint {
    ListenEndpoint(SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_SSH_PORT)))
}

#[inline]
pub(crate) fn _default_ssh_keys_path() -> String {
    "./data/keys".to_owned()
}

#[inline]
pub(crate) fn _default_shell() -> String {
    "bash".to_owned()
}

#[inline]
pub(crate) fn _default_shell_args() -> Vec<String> {
    vec!["-c".to_owned()]
}

#[inline]
pub(crate) fn _default_client_host() -> String {
    "localhost".to_owned()
}

pub(crate) const fn _default_client_port() -> u16 {
    DEFAULT_SSH_PORT
}

#[inline]
pub(crate) fn _default_client_user() -> String {
    "rexec".to_owned()
}
