use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Date-scoped monotonic identifier for a thread of work.
///
/// Textual form is `CTX-YYYY-MMDD-NNN` for sequence 1..999 or
/// `CTX-YYYY-MMDD-NNNN` for sequence 1000..9999. The sequence is never
/// zero and is meaningful only relative to its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceCode {
    date: NaiveDate,
    sequence: u16,
}

impl ReferenceCode {
    /// Build a reference code directly from its persisted `(date, sequence)`
    /// pair. Used by `SequenceStore` implementations when reconstructing a
    /// code that was just incremented and saved.
    pub fn from_parts(date: NaiveDate, sequence: u16) -> Result<Self, CoreError> {
        if sequence == 0 || sequence > 9999 {
            return Err(CoreError::InvalidReferenceCode(format!(
                "sequence {sequence} out of range 1..=9999"
            )));
        }
        Ok(Self { date, sequence })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use chrono::Datelike;
        if self.sequence < 1000 {
            write!(
                f,
                "CTX-{:04}-{:02}{:02}-{:03}",
                self.date.year(),
                self.date.month(),
                self.date.day(),
                self.sequence
            )
        } else {
            write!(
                f,
                "CTX-{:04}-{:02}{:02}-{:04}",
                self.date.year(),
                self.date.month(),
                self.date.day(),
                self.sequence
            )
        }
    }
}

impl FromStr for ReferenceCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidReferenceCode(s.to_string());

        let rest = s.strip_prefix("CTX-").ok_or_else(invalid)?;
        let mut parts = rest.split('-');
        let year_str = parts.next().ok_or_else(invalid)?;
        let mmdd_str = parts.next().ok_or_else(invalid)?;
        let seq_str = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        if year_str.len() != 4 || mmdd_str.len() != 4 {
            return Err(invalid());
        }
        if seq_str.len() != 3 && seq_str.len() != 4 {
            return Err(invalid());
        }
        // Reject width that doesn't match the numeric magnitude, per the
        // textual grammar: 1..999 must render as NNN, 1000..9999 as NNNN.
        let sequence: u16 = seq_str.parse().map_err(|_| invalid())?;
        if seq_str.len() == 3 && sequence >= 1000 {
            return Err(invalid());
        }
        if seq_str.len() == 4 && sequence < 1000 {
            return Err(invalid());
        }

        let year: i32 = year_str.parse().map_err(|_| invalid())?;
        let month: u32 = mmdd_str[0..2].parse().map_err(|_| invalid())?;
        let day: u32 = mmdd_str[2..4].parse().map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;

        Self::from_parts(date, sequence)
    }
}

impl TryFrom<String> for ReferenceCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceCode> for String {
    fn from(value: ReferenceCode) -> Self {
        value.to_string()
    }
}
