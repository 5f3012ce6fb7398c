use linedesk_sdk::LineId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DialPadError {
    #[error("dial pad is not open for any line")]
    NotOpen,
    #[error("please enter a phone number")]
    EmptyNumber,
    #[error("'{0}' is not a dial pad key")]
    InvalidKey(char),
}

/// Number entry for one line at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialPad {
    line: Option<LineId>,
    number: String,
}

impl DialPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, line_id: LineId) {
        self.line = Some(line_id);
        self.number.clear();
    }

    pub fn close(&mut self) {
        self.line = None;
        self.number.clear();
    }

    pub fn line(&self) -> Option<LineId> {
        self.line
    }

    pub fn is_open(&self) -> bool {
        self.line.is_some()
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn press(&mut self, key: char) -> Result<(), DialPadError> {
        if !is_dial_key(key) {
            return Err(DialPadError::InvalidKey(key));
        }
        self.number.push(key);
        Ok(())
    }

    pub fn backspace(&mut self) {
        self.number.pop();
    }

    pub fn clear(&mut self) {
        self.number.clear();
    }

    /// Replaces the buffer, e.g. with a pick from the recent numbers.
    pub fn fill(&mut self, number: &str) {
        self.number = number.trim().to_string();
    }

    /// Hands back the line and trimmed number to dial. The pad stays open
    /// until the caller closes it.
    pub fn submit(&self) -> Result<(LineId, String), DialPadError> {
        let line_id = self.line.ok_or(DialPadError::NotOpen)?;
        let number = self.number.trim();
        if number.is_empty() {
            return Err(DialPadError::EmptyNumber);
        }
        Ok((line_id, number.to_string()))
    }
}

fn is_dial_key(key: char) -> bool {
    key.is_ascii_digit() || matches!(key, '*' | '#' | '+')
}
