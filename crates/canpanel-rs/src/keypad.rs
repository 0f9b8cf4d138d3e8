//! Turns raw keypad scans into complete codes.

use crate::types::{PASSWORD_LEN, Password};

/// Maps a 4x4 keypad scan code to the character printed on the key.
pub const KEY_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Scan value reported by keypads with no key pressed.
pub const NO_KEY: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A key was accepted; `typed` characters are buffered so far.
    Partial { typed: usize },
    /// Four characters were typed. The buffer starts over.
    Complete(Password),
}

/// Debounces scans and collects keys into 4-character codes.
///
/// Call [`on_scan`](Self::on_scan) at a fixed rate. A key is accepted when
/// the two latest scans agree and differ from the one before, so a held key
/// is accepted once.
#[derive(Debug, Clone)]
pub struct KeypadCollector {
    /// Last three scans, newest first.
    history: [u8; 3],
    code: heapless::Vec<u8, PASSWORD_LEN>,
}

impl Default for KeypadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl KeypadCollector {
    pub const fn new() -> Self {
        Self {
            history: [NO_KEY; 3],
            code: heapless::Vec::new(),
        }
    }

    pub fn on_scan(&mut self, scan: Option<u8>) -> Option<KeyEvent> {
        let key = scan.filter(|k| (*k as usize) < KEY_CHARS.len()).unwrap_or(NO_KEY);
        self.history = [key, self.history[0], self.history[1]];
        let [k1, k2, k3] = self.history;
        if k1 != k2 || k1 == k3 || k1 == NO_KEY {
            return None;
        }

        // Capacity is checked below, the buffer is flushed when full.
        let _ = self.code.push(KEY_CHARS[k1 as usize]);
        if self.code.len() < PASSWORD_LEN {
            return Some(KeyEvent::Partial { typed: self.code.len() });
        }
        let password = Password::from_bytes(&self.code);
        self.code.clear();
        password.map(KeyEvent::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Presses each key for two scans followed by one idle scan.
    fn type_keys(collector: &mut KeypadCollector, keys: &[u8]) -> Option<KeyEvent> {
        let mut last = None;
        for key in keys {
            for scan in [Some(*key), Some(*key), None] {
                if let Some(event) = collector.on_scan(scan) {
                    last = Some(event);
                }
            }
        }
        last
    }

    #[test]
    fn four_keys_make_a_code() {
        let mut collector = KeypadCollector::new();
        let event = type_keys(&mut collector, &[0xB, 0x1, 0x6, 0x9]);
        assert_eq!(event, Some(KeyEvent::Complete(Password(*b"B169"))));
    }

    #[test]
    fn partial_progress_is_reported() {
        let mut collector = KeypadCollector::new();
        assert_eq!(type_keys(&mut collector, &[3, 4]), Some(KeyEvent::Partial { typed: 2 }));
    }

    #[test]
    fn held_key_counts_once() {
        let mut collector = KeypadCollector::new();
        let events: usize = (0..20).filter_map(|_| collector.on_scan(Some(7))).count();
        assert_eq!(events, 1);
    }

    #[test]
    fn single_scan_glitches_are_ignored() {
        let mut collector = KeypadCollector::new();
        for _ in 0..5 {
            assert_eq!(collector.on_scan(Some(1)), None);
            assert_eq!(collector.on_scan(None), None);
        }
        assert_eq!(collector.on_scan(Some(99)), None);
        assert_eq!(collector.on_scan(Some(99)), None);
    }
}
