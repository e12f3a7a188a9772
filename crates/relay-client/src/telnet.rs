//! Telnet side of the UI: option negotiation and key decoding.
//!
//! Input is a raw byte stream that mixes telnet commands (IAC ...) with what
//! the user typed.  Commands are skipped; arrow keys arrive as `ESC [ A` /
//! `ESC [ B` (or `ESC O A` in application mode) and enter as CR followed by
//! NUL or LF.

use crate::action::Key;

const IAC: u8 = 0xff;
const DONT: u8 = 0xfe;
const WILL: u8 = 0xfb;
const SB: u8 = 0xfa;
const SE: u8 = 0xf0;
const DO: u8 = 0xfd;
const ECHO: u8 = 0x01;
const LINEMODE: u8 = 0x22;
const ESC: u8 = 0x1b;

/// Character-at-a-time input, server-side echo.
pub const NEGOTIATE: [u8; 6] = [IAC, DO, LINEMODE, IAC, WILL, ECHO];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    /// After CR; swallow the NUL/LF that completes it.
    Cr,
    Iac,
    /// WILL/WONT/DO/DONT seen, one option byte follows.
    IacOption,
    Subneg,
    SubnegIac,
    Esc,
    Csi,
}

#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: State,
}

impl KeyDecoder {
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<Key>) {
        for &b in bytes {
            self.step(b, out);
        }
    }

    fn step(&mut self, b: u8, out: &mut Vec<Key>) {
        let state = self.state;
        self.state = match state {
            State::Data => match b {
                IAC => State::Iac,
                ESC => State::Esc,
                b'\r' => {
                    out.push(Key::Enter);
                    State::Cr
                }
                _ => State::Data,
            },
            State::Cr => match b {
                0 | b'\n' => State::Data,
                _ => {
                    self.state = State::Data;
                    return self.step(b, out);
                }
            },
            State::Iac => match b {
                SB => State::Subneg,
                WILL..=DONT => State::IacOption,
                _ => State::Data,
            },
            State::IacOption => State::Data,
            State::Subneg => match b {
                IAC => State::SubnegIac,
                _ => State::Subneg,
            },
            State::SubnegIac => match b {
                SE => State::Data,
                _ => State::Subneg,
            },
            State::Esc => match b {
                b'[' | b'O' => State::Csi,
                _ => {
                    self.state = State::Data;
                    return self.step(b, out);
                }
            },
            State::Csi => match b {
                b'A' => {
                    out.push(Key::Up);
                    State::Data
                }
                b'B' => {
                    out.push(Key::Down);
                    State::Data
                }
                0x40..=0x7e => State::Data,
                _ => State::Csi,
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(chunks: &[&[u8]]) -> Vec<Key> {
        let mut d = KeyDecoder::default();
        let mut out = Vec::new();
        for c in chunks {
            d.feed(c, &mut out);
        }
        out
    }

    #[test]
    fn test_arrows_and_enter() {
        assert_eq!(decode(&[b"\x1b[A"]), vec![Key::Up]);
        assert_eq!(decode(&[b"\x1b[B"]), vec![Key::Down]);
        assert_eq!(decode(&[b"\r\0"]), vec![Key::Enter]);
        assert_eq!(decode(&[b"\r\n"]), vec![Key::Enter]);
        assert_eq!(decode(&[b"\x1bOB"]), vec![Key::Down]);
    }

    #[test]
    fn test_sequences_split_across_reads() {
        assert_eq!(
            decode(&[b"\x1b", b"[", b"B\r", b"\0\x1b[A"]),
            vec![Key::Down, Key::Enter, Key::Up]
        );
    }

    #[test]
    fn test_negotiation_replies_are_skipped() {
        // typical client answer to NEGOTIATE, including a LINEMODE subnegotiation
        let reply: &[u8] = b"\xff\xfd\x03\xff\xfb\x22\xff\xfa\x22\x03\x01\x00\x00\x03\x62\xff\xf0";
        assert!(decode(&[reply]).is_empty());
        assert_eq!(decode(&[reply, b"\x1b[B"]), vec![Key::Down]);
    }

    #[test]
    fn test_other_input_ignored() {
        assert!(decode(&[b"hello\x1b[C\x1b[D"]).is_empty());
        assert_eq!(decode(&[b"\r\r\0"]), vec![Key::Enter, Key::Enter]);
    }
}
