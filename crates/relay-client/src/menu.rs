//! Menu cursor over the screen lines.
//!
//! Line 0 is "search", lines 1..=n are relays, line n+1 is "end".  The relay
//! list can shrink under the cursor (failover), so every entry point clamps.
//! `relays` is always the list the user was last shown, so Enter picks the
//! relay that was on screen even if the table has moved since.

use std::net::SocketAddr;

use crate::action::{Action, Key, Target};

#[derive(Debug, Default)]
pub struct Menu {
    cursor: usize,
}

impl Menu {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn end_line(relay_count: usize) -> usize {
        relay_count + 1
    }

    pub fn clamp(&mut self, relay_count: usize) {
        self.cursor = self.cursor.min(Self::end_line(relay_count));
    }

    pub fn handle(&mut self, key: Key, relays: &[SocketAddr]) -> Action {
        self.clamp(relays.len());
        match key {
            Key::Up => {
                if self.cursor == 0 {
                    return Action::Noop;
                }
                self.cursor -= 1;
                Action::Redraw
            }
            Key::Down => {
                if self.cursor == Self::end_line(relays.len()) {
                    return Action::Noop;
                }
                self.cursor += 1;
                Action::Redraw
            }
            Key::Enter => match self.cursor {
                0 => Action::Discover(Target::Broadcast),
                line if line <= relays.len() => Action::Discover(Target::Relay(relays[line - 1])),
                _ => Action::Quit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relays(n: u16) -> Vec<SocketAddr> {
        (1..=n).map(|p| SocketAddr::from(([10, 0, 0, 2], p))).collect()
    }

    #[test]
    fn test_navigation_is_clamped() {
        let two = relays(2);
        let mut menu = Menu::default();
        assert_eq!(menu.handle(Key::Up, &two), Action::Noop);
        assert_eq!(menu.cursor(), 0);

        for _ in 0..3 {
            assert_eq!(menu.handle(Key::Down, &two), Action::Redraw);
        }
        assert_eq!(menu.cursor(), 3);
        assert_eq!(menu.handle(Key::Down, &two), Action::Noop);
        assert_eq!(menu.cursor(), 3);
    }

    #[test]
    fn test_enter_per_line() {
        let two = relays(2);
        let mut menu = Menu::default();
        assert_eq!(menu.handle(Key::Enter, &two), Action::Discover(Target::Broadcast));

        menu.handle(Key::Down, &two);
        assert_eq!(menu.handle(Key::Enter, &two), Action::Discover(Target::Relay(two[0])));
        menu.handle(Key::Down, &two);
        assert_eq!(menu.handle(Key::Enter, &two), Action::Discover(Target::Relay(two[1])));
        menu.handle(Key::Down, &two);
        assert_eq!(menu.handle(Key::Enter, &two), Action::Quit);
    }

    #[test]
    fn test_no_relays_means_search_and_end() {
        let mut menu = Menu::default();
        menu.handle(Key::Down, &[]);
        assert_eq!(menu.cursor(), 1);
        assert_eq!(menu.handle(Key::Enter, &[]), Action::Quit);
    }

    #[test]
    fn test_shrinking_table_pulls_cursor_back() {
        let mut menu = Menu::default();
        for _ in 0..4 {
            menu.handle(Key::Down, &relays(3));
        }
        assert_eq!(menu.cursor(), 4);
        // relay dropped: end line moves from 4 to 3
        menu.clamp(2);
        assert_eq!(menu.cursor(), 3);
        assert_eq!(menu.handle(Key::Enter, &relays(2)), Action::Quit);
    }
}
