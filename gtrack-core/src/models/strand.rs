use std::fmt::{self, Display};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::GtrackError;

///
/// Strand of a genomic interval.
///
/// The declaration order is the total order used when sorting intervals:
/// `Unknown < Forward < Reverse < Both`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strand {
    /// `?`
    Unknown,
    /// `+`
    Forward,
    /// `-`
    Reverse,
    /// `.`, strand is irrelevant or the interval covers both strands
    #[default]
    Both,
}

impl Strand {
    ///
    /// Single character wire representation of the strand.
    ///
    pub fn as_char(&self) -> char {
        match self {
            Strand::Unknown => '?',
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Both => '.',
        }
    }

    /// Swap forward and reverse; other strands are returned unchanged.
    pub fn complement(&self) -> Strand {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
            other => *other,
        }
    }
}

impl TryFrom<char> for Strand {
    type Error = GtrackError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '?' => Ok(Strand::Unknown),
            '+' => Ok(Strand::Forward),
            '-' => Ok(Strand::Reverse),
            '.' => Ok(Strand::Both),
            other => Err(GtrackError::Precondition(format!(
                "'{other}' is not a strand, expected one of '?', '+', '-', '.'"
            ))),
        }
    }
}

impl FromStr for Strand {
    type Err = GtrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Strand::try_from(c),
            _ => Err(GtrackError::Precondition(format!(
                "'{s}' is not a strand, expected a single character"
            ))),
        }
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
