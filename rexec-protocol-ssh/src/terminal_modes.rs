//! Encoded terminal modes carried inside a `pty-req` channel request
//! (RFC 4254, section 8).
//!
//! On the wire the modes are a flat list of `(opcode: u8, argument: u32)`
//! entries terminated by [TerminalOpcode::TTY_OP_END].

use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use russh::Pty;

const ENTRY_LEN: usize = 5;

/// Most entries the SSH library's server decodes from one `pty-req`.
/// Longer mode lists abort the connection.
pub const MAX_TRANSPORT_MODES: usize = 130;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalOpcode(pub u8);

impl TerminalOpcode {
    pub const TTY_OP_END: Self = Self(0);
    pub const VINTR: Self = Self(1);
    pub const VQUIT: Self = Self(2);
    pub const VERASE: Self = Self(3);
    pub const VKILL: Self = Self(4);
    pub const VEOF: Self = Self(5);
    pub const VEOL: Self = Self(6);
    pub const VEOL2: Self = Self(7);
    pub const VSTART: Self = Self(8);
    pub const VSTOP: Self = Self(9);
    pub const VSUSP: Self = Self(10);
    pub const VDSUSP: Self = Self(11);
    pub const VREPRINT: Self = Self(12);
    pub const VWERASE: Self = Self(13);
    pub const VLNEXT: Self = Self(14);
    pub const VFLUSH: Self = Self(15);
    pub const VSWTCH: Self = Self(16);
    pub const VSTATUS: Self = Self(17);
    pub const VDISCARD: Self = Self(18);
    pub const IGNPAR: Self = Self(30);
    pub const PARMRK: Self = Self(31);
    pub const INPCK: Self = Self(32);
    pub const ISTRIP: Self = Self(33);
    pub const INLCR: Self = Self(34);
    pub const IGNCR: Self = Self(35);
    pub const ICRNL: Self = Self(36);
    pub const IUCLC: Self = Self(37);
    pub const IXON: Self = Self(38);
    pub const IXANY: Self = Self(39);
    pub const IXOFF: Self = Self(40);
    pub const IMAXBEL: Self = Self(41);
    pub const ISIG: Self = Self(50);
    pub const ICANON: Self = Self(51);
    pub const XCASE: Self = Self(52);
    pub const ECHO: Self = Self(53);
    pub const ECHOE: Self = Self(54);
    pub const ECHOK: Self = Self(55);
    pub const ECHONL: Self = Self(56);
    pub const NOFLSH: Self = Self(57);
    pub const TOSTOP: Self = Self(58);
    pub const IEXTEN: Self = Self(59);
    pub const ECHOCTL: Self = Self(60);
    pub const ECHOKE: Self = Self(61);
    pub const PENDIN: Self = Self(62);
    pub const OPOST: Self = Self(70);
    pub const OLCUC: Self = Self(71);
    pub const ONLCR: Self = Self(72);
    pub const OCRNL: Self = Self(73);
    pub const ONOCR: Self = Self(74);
    pub const ONLRET: Self = Self(75);
    pub const CS7: Self = Self(90);
    pub const CS8: Self = Self(91);
    pub const PARENB: Self = Self(92);
    pub const PARODD: Self = Self(93);
    pub const TTY_OP_ISPEED: Self = Self(128);
    pub const TTY_OP_OSPEED: Self = Self(129);

    pub fn is_end(self) -> bool {
        self == Self::TTY_OP_END
    }
}

impl Debug for TerminalOpcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match Pty::from_u8(self.0) {
            Some(pty) => write!(f, "{pty:?}"),
            None => write!(f, "TerminalOpcode({})", self.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalMode {
    pub opcode: TerminalOpcode,
    pub argument: u32,
}

impl TerminalMode {
    pub fn new(opcode: TerminalOpcode, argument: u32) -> Self {
        Self { opcode, argument }
    }

    /// `None` for opcodes unknown to the SSH library.
    pub fn to_russh(self) -> Option<(Pty, u32)> {
        Pty::from_u8(self.opcode.0).map(|pty| (pty, self.argument))
    }
}

impl From<(Pty, u32)> for TerminalMode {
    fn from((pty, argument): (Pty, u32)) -> Self {
        Self::new(TerminalOpcode(pty as u8), argument)
    }
}

/// Modes as the SSH library hands them to the server.
///
/// Entries with opcodes unknown to the library arrive as `TTY_OP_END`
/// placeholders and are skipped; every other entry keeps its position.
pub fn modes_from_russh(modes: &[(Pty, u32)]) -> Vec<TerminalMode> {
    modes
        .iter()
        .cloned()
        .map(TerminalMode::from)
        .filter(|mode| !mode.opcode.is_end())
        .collect()
}

/// Modes in the shape the SSH library sends them.
///
/// The library cannot express opcodes it does not know, and its server side
/// stops at [MAX_TRANSPORT_MODES] entries, so those are dropped here.
pub fn modes_to_russh(modes: &[TerminalMode]) -> Vec<(Pty, u32)> {
    let mut converted = Vec::with_capacity(modes.len().min(MAX_TRANSPORT_MODES));
    for mode in modes.iter().filter(|mode| !mode.opcode.is_end()) {
        let Some(entry) = mode.to_russh() else {
            tracing::debug!(opcode=?mode.opcode, "Dropping terminal mode unknown to the transport");
            continue;
        };
        if converted.len() == MAX_TRANSPORT_MODES {
            tracing::warn!(total = modes.len(), "Too many terminal modes, dropping the rest");
            break;
        }
        converted.push(entry);
    }
    converted
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TerminalModeError {
    #[error("truncated terminal mode entry at offset {offset}")]
    TruncatedEntry { offset: usize },
    #[error("terminal modes are not terminated by TTY_OP_END")]
    MissingEnd,
}

/// Encodes `modes` in order followed by the end marker.
///
/// The output is always `5 * modes.len() + 1` bytes long. An entry whose
/// opcode is [TerminalOpcode::TTY_OP_END] would cut decoding short, so callers
/// should not pass one.
pub fn encode_terminal_modes(modes: &[TerminalMode]) -> Bytes {
    let mut buf = BytesMut::with_capacity(modes.len() * ENTRY_LEN + 1);
    for mode in modes {
        buf.put_u8(mode.opcode.0);
        buf.put_u32(mode.argument);
    }
    buf.put_u8(TerminalOpcode::TTY_OP_END.0);
    buf.freeze()
}

/// Decodes the modes, stopping at the end marker.
///
/// Anything after the end marker is left unconsumed. Truncated input is
/// reported together with every complete entry read before it.
pub fn try_decode_terminal_modes(
    data: &[u8],
) -> Result<Vec<TerminalMode>, (Vec<TerminalMode>, TerminalModeError)> {
    let mut buf = data;
    let mut modes = vec![];
    loop {
        if !buf.has_remaining() {
            return if data.is_empty() {
                Ok(modes)
            } else {
                Err((modes, TerminalModeError::MissingEnd))
            };
        }
        let offset = data.len() - buf.remaining();
        let opcode = TerminalOpcode(buf.get_u8());
        if opcode.is_end() {
            return Ok(modes);
        }
        if buf.remaining() < 4 {
            return Err((modes, TerminalModeError::TruncatedEntry { offset }));
        }
        modes.push(TerminalMode::new(opcode, buf.get_u32()));
    }
}

/// Lenient decoding: malformed input yields the entries decoded so far.
pub fn decode_terminal_modes(data: &[u8]) -> Vec<TerminalMode> {
    match try_decode_terminal_modes(data) {
        Ok(modes) => modes,
        Err((modes, error)) => {
            tracing::debug!(%error, decoded = modes.len(), "Malformed terminal modes");
            modes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TerminalMode> {
        vec![
            TerminalMode::new(TerminalOpcode::VINTR, 3),
            TerminalMode::new(TerminalOpcode::ECHO, 0),
            TerminalMode::new(TerminalOpcode::VINTR, 255),
            TerminalMode::new(TerminalOpcode::TTY_OP_OSPEED, 38400),
            TerminalMode::new(TerminalOpcode(200), 0xdead_beef),
        ]
    }

    #[test]
    fn encoded_length_is_five_per_entry_plus_end() {
        assert_eq!(encode_terminal_modes(&[]).len(), 1);
        assert_eq!(encode_terminal_modes(&sample()).len(), 5 * 5 + 1);
    }

    #[test]
    fn encode_writes_entries_in_order() {
        let encoded = encode_terminal_modes(&[
            TerminalMode::new(TerminalOpcode::ECHO, 1),
            TerminalMode::new(TerminalOpcode::TTY_OP_ISPEED, 0x0102_0304),
        ]);
        assert_eq!(&encoded[..], &[53, 0, 0, 0, 1, 128, 1, 2, 3, 4, 0][..]);
    }

    #[test]
    fn decode_preserves_order_and_duplicates() {
        let modes = sample();
        assert_eq!(decode_terminal_modes(&encode_terminal_modes(&modes)), modes);
    }

    #[test]
    fn end_marker_alone_is_empty() {
        assert_eq!(try_decode_terminal_modes(&[0]), Ok(vec![]));
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(try_decode_terminal_modes(&[]), Ok(vec![]));
    }

    #[test]
    fn bytes_after_end_are_ignored() {
        let decoded = try_decode_terminal_modes(&[53, 0, 0, 0, 1, 0, 0xff, 0xff, 7]).unwrap();
        assert_eq!(decoded, vec![TerminalMode::new(TerminalOpcode::ECHO, 1)]);
    }

    #[test]
    fn truncated_entry_keeps_complete_prefix() {
        let data = [53, 0, 0, 0, 1, 50, 0, 0];
        let (partial, error) = try_decode_terminal_modes(&data).unwrap_err();
        assert_eq!(partial, vec![TerminalMode::new(TerminalOpcode::ECHO, 1)]);
        assert_eq!(error, TerminalModeError::TruncatedEntry { offset: 5 });
        assert_eq!(decode_terminal_modes(&data), partial);
    }

    #[test]
    fn missing_end_keeps_entries() {
        let data = [50, 0, 0, 0, 1];
        let (partial, error) = try_decode_terminal_modes(&data).unwrap_err();
        assert_eq!(partial, vec![TerminalMode::new(TerminalOpcode::ISIG, 1)]);
        assert_eq!(error, TerminalModeError::MissingEnd);
    }

    #[test]
    fn converts_to_and_from_russh() {
        let mode = TerminalMode::from((Pty::ICANON, 1));
        assert_eq!(mode.opcode, TerminalOpcode::ICANON);
        assert_eq!(mode.to_russh(), Some((Pty::ICANON, 1)));
        assert_eq!(TerminalMode::new(TerminalOpcode(200), 1).to_russh(), None);
    }

    #[test]
    fn placeholders_from_transport_do_not_hide_later_modes() {
        // An unknown opcode between two known ones, as the server library reports it
        let received = [
            (Pty::ECHO, 1),
            (Pty::TTY_OP_END, 0),
            (Pty::ICANON, 1),
        ];
        assert_eq!(
            modes_from_russh(&received),
            vec![
                TerminalMode::new(TerminalOpcode::ECHO, 1),
                TerminalMode::new(TerminalOpcode::ICANON, 1),
            ]
        );
    }

    #[test]
    fn full_transport_buffer_keeps_order_and_duplicates() {
        let mut received = [(Pty::TTY_OP_END, 0); MAX_TRANSPORT_MODES];
        received[0] = (Pty::VINTR, 3);
        received[5] = (Pty::VINTR, 255);
        received[MAX_TRANSPORT_MODES - 1] = (Pty::TTY_OP_OSPEED, 38400);
        assert_eq!(
            modes_from_russh(&received),
            vec![
                TerminalMode::new(TerminalOpcode::VINTR, 3),
                TerminalMode::new(TerminalOpcode::VINTR, 255),
                TerminalMode::new(TerminalOpcode::TTY_OP_OSPEED, 38400),
            ]
        );
    }

    #[test]
    fn outgoing_modes_skip_unrepresentable_entries() {
        let modes = [
            TerminalMode::new(TerminalOpcode::ECHO, 1),
            TerminalMode::new(TerminalOpcode(200), 7),
            TerminalMode::new(TerminalOpcode::TTY_OP_END, 0),
            TerminalMode::new(TerminalOpcode::ICANON, 0),
        ];
        assert_eq!(modes_to_russh(&modes), vec![(Pty::ECHO, 1), (Pty::ICANON, 0)]);
    }

    #[test]
    fn outgoing_modes_are_capped_for_the_transport() {
        let modes = vec![TerminalMode::new(TerminalOpcode::ECHO, 1); MAX_TRANSPORT_MODES + 1];
        let converted = modes_to_russh(&modes);
        assert_eq!(converted.len(), MAX_TRANSPORT_MODES);
        assert!(converted.iter().all(|entry| *entry == (Pty::ECHO, 1)));
    }
}
