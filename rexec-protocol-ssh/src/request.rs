//! Session channel requests understood by the server (RFC 4254, section 6).

use std::borrow::Cow;

use russh::Sig;

use crate::common::PtyRequest;

pub const REQUEST_PTY: &str = "pty-req";
pub const REQUEST_EXEC: &str = "exec";
pub const REQUEST_SIGNAL: &str = "signal";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRequest {
    Pty(PtyRequest),
    Exec(String),
    Signal(String),
    /// Any other request type. Ignored without a reply.
    Unknown(String),
}

impl ChannelRequest {
    pub fn request_type(&self) -> &str {
        match self {
            ChannelRequest::Pty(_) => REQUEST_PTY,
            ChannelRequest::Exec(_) => REQUEST_EXEC,
            ChannelRequest::Signal(_) => REQUEST_SIGNAL,
            ChannelRequest::Unknown(name) => name,
        }
    }
}

/// `INT` becomes `SIGINT`; names that already carry the prefix are kept.
pub fn normalize_signal_name(name: &str) -> Cow<'_, str> {
    if name.starts_with("SIG") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("SIG{name}"))
    }
}

/// Signal name as carried on the wire, without the `SIG` prefix.
pub fn signal_wire_name(signal: &Sig) -> Cow<'_, str> {
    Cow::Borrowed(match signal {
        Sig::ABRT => "ABRT",
        Sig::ALRM => "ALRM",
        Sig::FPE => "FPE",
        Sig::HUP => "HUP",
        Sig::ILL => "ILL",
        Sig::INT => "INT",
        Sig::KILL => "KILL",
        Sig::PIPE => "PIPE",
        Sig::QUIT => "QUIT",
        Sig::SEGV => "SEGV",
        Sig::TERM => "TERM",
        Sig::USR1 => "USR1",
        Sig::Custom(name) => return Cow::Borrowed(name.as_str()),
    })
}

pub fn signal_from_wire_name(name: &str) -> Sig {
    match name.strip_prefix("SIG").unwrap_or(name) {
        "ABRT" => Sig::ABRT,
        "ALRM" => Sig::ALRM,
        "FPE" => Sig::FPE,
        "HUP" => Sig::HUP,
        "ILL" => Sig::ILL,
        "INT" => Sig::INT,
        "KILL" => Sig::KILL,
        "PIPE" => Sig::PIPE,
        "QUIT" => Sig::QUIT,
        "SEGV" => Sig::SEGV,
        "TERM" => Sig::TERM,
        "USR1" => Sig::USR1,
        other => Sig::Custom(other.to_owned()),
    }
}
