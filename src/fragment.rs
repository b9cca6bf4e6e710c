use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mate-orientation code of a read pair, first read strand then second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ff,
    Fr,
    Rf,
    Rr,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Ff, Direction::Fr, Direction::Rf, Direction::Rr];

    pub fn from_strands(first_reverse: bool, second_reverse: bool) -> Self {
        match (first_reverse, second_reverse) {
            (false, false) => Self::Ff,
            (false, true) => Self::Fr,
            (true, false) => Self::Rf,
            (true, true) => Self::Rr,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ff" => Ok(Self::Ff),
            "fr" => Ok(Self::Fr),
            "rf" => Ok(Self::Rf),
            "rr" => Ok(Self::Rr),
            other => Err(AppError::ParseError {
                message: format!("invalid direction code: {other}"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ff => "ff",
            Self::Fr => "fr",
            Self::Rf => "rf",
            Self::Rr => "rr",
        }
    }

    /// The code read with the two ends relabeled, used when canonicalizing
    /// inter-chromosomal fragments.
    pub fn swapped(&self) -> Self {
        match self {
            Self::Ff => Self::Ff,
            Self::Fr => Self::Rf,
            Self::Rf => Self::Fr,
            Self::Rr => Self::Rr,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded read pair. Inter-chromosomal fragments are stored with
/// `first_chr < second_chr`; the constructor swaps the ends to enforce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub first_chr: String,
    pub first_begin: i64,
    pub second_chr: String,
    pub second_begin: i64,
    pub direction: Direction,
    pub length: Option<i64>,
    pub is_abnormal: bool,
}

impl Fragment {
    pub fn new(
        name: String,
        first_chr: String,
        first_begin: i64,
        second_chr: String,
        second_begin: i64,
        direction: Direction,
        length: Option<i64>,
    ) -> Self {
        let mut fragment = Self {
            name,
            first_chr,
            first_begin,
            second_chr,
            second_begin,
            direction,
            length,
            is_abnormal: false,
        };
        if fragment.first_chr > fragment.second_chr {
            std::mem::swap(&mut fragment.first_chr, &mut fragment.second_chr);
            std::mem::swap(&mut fragment.first_begin, &mut fragment.second_begin);
            fragment.direction = fragment.direction.swapped();
        }
        fragment
    }

    pub fn is_intra(&self) -> bool {
        self.first_chr == self.second_chr
    }

    pub fn is_translocation(&self) -> bool {
        !self.is_intra()
    }

    pub fn begin(&self) -> i64 {
        if self.is_intra() {
            self.first_begin.min(self.second_begin)
        } else {
            self.first_begin
        }
    }

    /// Breakpoint coordinates used when clustering: for intra-chromosomal
    /// fragments the covered template span, for translocations the two
    /// anchored positions in canonical chromosome order.
    pub fn breakpoints(&self) -> (i64, i64) {
        match self.length {
            Some(length) => {
                let begin = self.first_begin.min(self.second_begin);
                (begin, begin + length)
            }
            None => (self.first_begin, self.second_begin),
        }
    }

    /// Parses a line produced by `to_string`. Exact inverse: no
    /// canonicalization or other normalization is applied.
    pub fn from_string(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 {
            return Err(AppError::ParseError {
                message: format!("invalid fragment line: {line}"),
            });
        }
        let first_begin = parse_coordinate(fields[2], line)?;
        let second_begin = parse_coordinate(fields[4], line)?;
        let direction = Direction::parse(fields[5])?;
        let length = match fields[6] {
            "." => None,
            value => Some(parse_coordinate(value, line)?),
        };
        let is_abnormal = match fields[7] {
            "0" => false,
            "1" => true,
            other => {
                return Err(AppError::ParseError {
                    message: format!("invalid abnormal flag: {other}"),
                })
            }
        };
        Ok(Self {
            name: fields[0].to_string(),
            first_chr: fields[1].to_string(),
            first_begin,
            second_chr: fields[3].to_string(),
            second_begin,
            direction,
            length,
            is_abnormal,
        })
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t",
            self.name, self.first_chr, self.first_begin, self.second_chr, self.second_begin,
            self.direction
        )?;
        match self.length {
            Some(length) => write!(f, "{length}")?,
            None => f.write_str(".")?,
        }
        write!(f, "\t{}", u8::from(self.is_abnormal))
    }
}

fn parse_coordinate(value: &str, line: &str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| AppError::ParseError {
        message: format!("invalid coordinate {value} in fragment line: {line}"),
    })
}

/// Chromosome-name equality across naming schemes: an optional `chr` prefix
/// is ignored and the remainder compared case-insensitively, so `chr1`
/// matches `1` but never `11`.
pub fn chrom_eq(left: &str, right: &str) -> bool {
    normalize_chrom(left).eq_ignore_ascii_case(normalize_chrom(right))
}

fn normalize_chrom(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.len() >= 3 {
        let bytes = trimmed.as_bytes();
        if bytes[0].eq_ignore_ascii_case(&b'c')
            && bytes[1].eq_ignore_ascii_case(&b'h')
            && bytes[2].eq_ignore_ascii_case(&b'r')
        {
            return &trimmed[3..];
        }
    }
    trimmed
}

/// Maps a reference name onto its configured spelling, so every fragment end
/// carries the same form no matter how the input file writes it. Names
/// outside the configured list are kept as written.
pub fn resolve_chrom_name(name: &str, chromosomes: &[String]) -> String {
    for configured in chromosomes {
        if chrom_eq(name, configured) {
            return configured.clone();
        }
    }
    name.to_string()
}
