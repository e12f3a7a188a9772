//! Full-screen redraw for a telnet session, as ANSI sequences queued through
//! crossterm into a byte buffer.

use std::io::{self, Write};
use std::net::SocketAddr;

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{Clear, ClearType};

const SEARCH_LABEL: &str = "Search relays";
const RELAY_LABEL: &str = "Relay ";
const END_LABEL: &str = "End";
const SELECTED_MARK: &str = " *";
const NEWLINE: &str = "\r\n";

/// Everything a redraw needs, snapshotted out of the shared state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    pub relays: Vec<String>,
    /// Endpoints in the same order as `relays`; not drawn.
    pub endpoints: Vec<SocketAddr>,
    pub selected: Option<usize>,
    pub cursor: usize,
    pub metadata: Vec<u8>,
}

pub fn render(screen: &Screen) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    let end = screen.relays.len() + 1;
    for line in 0..=end + 1 {
        let marked = line == screen.cursor;
        if marked {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }

        if line == 0 {
            queue!(out, Print(SEARCH_LABEL))?;
        } else if line < end {
            let idx = line - 1;
            queue!(out, Print(RELAY_LABEL), Print(&screen.relays[idx]))?;
            if screen.selected == Some(idx) {
                queue!(out, Print(SELECTED_MARK))?;
            }
        } else if line == end {
            queue!(out, Print(END_LABEL))?;
        } else {
            out.write_all(&screen.metadata)?;
        }

        queue!(out, Print(NEWLINE))?;
        if marked {
            queue!(out, SetAttribute(Attribute::Reset))?;
        }
    }
    Ok(out)
}
