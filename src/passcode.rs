//! Keypad passcode entry shared by every passcode prompt.

/// Digits typed on a keypad, capped at `max_length`.
///
/// The code is handed over by `submit`, which also clears the entry, so a
/// prompt never keeps a stale code around whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasscodeEntry {
    max_length: usize,
    digits: String,
}

impl PasscodeEntry {
    pub fn new(max_length: usize) -> Self {
        PasscodeEntry { max_length, digits: String::new() }
    }

    /// Append a digit. Non-digits and input beyond the cap are ignored.
    pub fn push(&mut self, key: char) -> bool {
        if !key.is_ascii_digit() || self.digits.len() >= self.max_length {
            return false;
        }
        self.digits.push(key);
        true
    }

    pub fn backspace(&mut self) {
        self.digits.pop();
    }

    /// Take the entered code, leaving the entry empty.
    pub fn submit(&mut self) -> String {
        std::mem::take(&mut self.digits)
    }

    pub fn cancel(&mut self) {
        self.digits.clear();
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// One filled dot per entered digit, open dots for the rest.
    pub fn masked(&self) -> String {
        let filled = self.digits.len();
        let mut out = String::new();
        for i in 0..self.max_length {
            if i > 0 {
                out.push(' ');
            }
            out.push(if i < filled { '●' } else { '○' });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_caps_and_filters_input() {
        let mut entry = PasscodeEntry::new(4);
        for key in "12a345".chars() {
            entry.push(key);
        }
        assert_eq!(entry.len(), 4);
        assert_eq!(entry.masked(), "● ● ● ●");
        entry.backspace();
        assert_eq!(entry.masked(), "● ● ● ○");
        assert_eq!(entry.submit(), "123");
        assert!(entry.is_empty());
    }

    #[test]
    fn test_cancel_clears() {
        let mut entry = PasscodeEntry::new(6);
        entry.push('9');
        entry.cancel();
        assert_eq!(entry.submit(), "");
    }
}
