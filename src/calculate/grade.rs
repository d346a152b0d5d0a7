//! Grade normalization.
//!
//! Maps roped (YDS, `5.11a`) and bouldering (`V4`) grades onto one
//! monotonic score so they can be compared:
//!
//! - roped: `major + letter`, with a/b/c/d adding 0.00/0.25/0.50/0.75
//! - bouldering: `10 + 0.25 * v`, so V0 sits with 5.10a and V4 with 5.11a
//!
//! The bouldering offset is a heuristic equivalence, not a conversion table.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static ROPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\D)5\.(\d{1,2})([a-d])?(?:\s*/\s*([a-d]))?")
        .expect("valid roped grade regex")
});

static BOULDERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bv(\d{1,2})").expect("valid bouldering grade regex"));

const BOULDER_BASE: f64 = 10.0;
const BOULDER_STEP: f64 = 0.25;

/// Letter subdivision of a roped grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subgrade {
    A,
    B,
    C,
    D,
}

impl Subgrade {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_lowercase().as_str() {
            "a" => Some(Subgrade::A),
            "b" => Some(Subgrade::B),
            "c" => Some(Subgrade::C),
            "d" => Some(Subgrade::D),
            _ => None,
        }
    }

    /// Score added on top of the major number.
    pub fn value(self) -> f64 {
        match self {
            Subgrade::A => 0.0,
            Subgrade::B => 0.25,
            Subgrade::C => 0.5,
            Subgrade::D => 0.75,
        }
    }

    fn letter(self) -> char {
        match self {
            Subgrade::A => 'a',
            Subgrade::B => 'b',
            Subgrade::C => 'c',
            Subgrade::D => 'd',
        }
    }
}

/// A recognized difficulty rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Unrecognized,
    /// `5.<major><subgrade>`; compound grades keep the harder letter
    Roped {
        major: u32,
        subgrade: Option<Subgrade>,
    },
    /// `V<v>`
    Bouldering { v: u32 },
}

impl Grade {
    /// Recognize a rating, trying the roped grammar before the bouldering one.
    pub fn parse(rating: &str) -> Self {
        if let Some(caps) = ROPED.captures(rating) {
            if let Ok(major) = caps[1].parse::<u32>() {
                let first = caps.get(2).and_then(|m| Subgrade::from_letter(m.as_str()));
                let second = caps.get(3).and_then(|m| Subgrade::from_letter(m.as_str()));
                return Grade::Roped {
                    major,
                    subgrade: first.max(second),
                };
            }
        }

        if let Some(caps) = BOULDERING.captures(rating) {
            if let Ok(v) = caps[1].parse::<u32>() {
                return Grade::Bouldering { v };
            }
        }

        Grade::Unrecognized
    }

    /// Position on the shared difficulty scale.
    pub fn score(&self) -> f64 {
        match self {
            Grade::Unrecognized => 0.0,
            Grade::Roped { major, subgrade } => {
                f64::from(*major) + subgrade.map_or(0.0, Subgrade::value)
            }
            Grade::Bouldering { v } => BOULDER_BASE + BOULDER_STEP * f64::from(*v),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Grade::Unrecognized)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Unrecognized => write!(f, "?"),
            Grade::Roped { major, subgrade } => match subgrade {
                Some(s) => write!(f, "5.{}{}", major, s.letter()),
                None => write!(f, "5.{}", major),
            },
            Grade::Bouldering { v } => write!(f, "V{}", v),
        }
    }
}

/// Score a free-text rating. Unrecognized text scores 0.
pub fn score(rating: &str) -> f64 {
    Grade::parse(rating).score()
}
