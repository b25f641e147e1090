use std::fmt::{Display, Formatter};

use russh::ChannelId;

use crate::terminal_modes::TerminalMode;

/// Extended data type code for stderr (RFC 4254, section 5.2).
pub const SSH_EXTENDED_DATA_STDERR: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub col_width: u32,
    pub row_height: u32,
    pub pix_width: u32,
    pub pix_height: u32,
    pub modes: Vec<TerminalMode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Hash, Eq)]
pub struct ServerChannelId(pub ChannelId);

impl Display for ServerChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
