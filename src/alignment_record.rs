//! Alignment result records and their tab-separated text encoding.
//!
//! A record line holds ten mandatory columns:
//! `target score identity evalue qStart qEnd qLen tStart tEnd tLen`,
//! optionally followed by four ORF-position columns and/or a backtrace column.

use std::io;
use std::num::{ParseFloatError, ParseIntError};

#[derive(Debug)]
pub enum ParseErr {
    UnexpectedColumnCount(usize),
    InvalidField(ParseIntError),
    InvalidFloat(ParseFloatError),
    InvalidUtf8,
    InvalidFormat(String),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::UnexpectedColumnCount(n) => {
                write!(f, "Unexpected number of columns in alignment record: {n}")
            }
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {e}"),
            ParseErr::InvalidFloat(e) => write!(f, "Invalid floating point field: {e}"),
            ParseErr::InvalidUtf8 => write!(f, "Record is not valid UTF-8"),
            ParseErr::InvalidFormat(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ParseErr {}

impl From<ParseErr> for io::Error {
    fn from(e: ParseErr) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// Coordinates of the aligned ORFs on their source sequences.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrfPositions {
    pub query_start: i32,
    pub query_end: i32,
    pub target_start: i32,
    pub target_end: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentRecord {
    pub target_key: u32,
    pub score: i32,
    pub seq_identity: f32,
    pub evalue: f64,
    pub query_start: i32,
    pub query_end: i32,
    pub query_len: i32,
    pub target_start: i32,
    pub target_end: i32,
    pub target_len: i32,
    pub orf_positions: Option<OrfPositions>,
    /// Kept when parsed, never written back out.
    pub backtrace: Option<String>,
}

const BASE_COLUMNS: usize = 10;
const ORF_COLUMNS: usize = 4;

impl AlignmentRecord {
    /// Parse a single record line. A trailing newline is ignored.
    pub fn parse_line(line: &str) -> Result<Self, ParseErr> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split('\t').collect();

        let (has_orf_positions, has_backtrace) = match fields.len() {
            10 => (false, false),
            11 => (false, true),
            14 => (true, false),
            15 => (true, true),
            n => return Err(ParseErr::UnexpectedColumnCount(n)),
        };

        let int = |idx: usize| fields[idx].parse::<i32>().map_err(ParseErr::InvalidField);

        let orf_positions = if has_orf_positions {
            Some(OrfPositions {
                query_start: int(BASE_COLUMNS)?,
                query_end: int(BASE_COLUMNS + 1)?,
                target_start: int(BASE_COLUMNS + 2)?,
                target_end: int(BASE_COLUMNS + 3)?,
            })
        } else {
            None
        };

        let backtrace = has_backtrace.then(|| fields[fields.len() - 1].to_string());

        Ok(AlignmentRecord {
            target_key: fields[0].parse::<u32>().map_err(ParseErr::InvalidField)?,
            score: int(1)?,
            seq_identity: fields[2].parse::<f32>().map_err(ParseErr::InvalidFloat)?,
            evalue: fields[3].parse::<f64>().map_err(ParseErr::InvalidFloat)?,
            query_start: int(4)?,
            query_end: int(5)?,
            query_len: int(6)?,
            target_start: int(7)?,
            target_end: int(8)?,
            target_len: int(9)?,
            orf_positions,
            backtrace,
        })
    }

    /// Append the text encoding of this record, newline-terminated, to `out`.
    /// ORF-position columns are only written when `add_orf_positions` is set.
    pub fn write_to(&self, out: &mut String, add_orf_positions: bool) {
        out.push_str(&format!(
            "{}\t{}\t{:.3}\t",
            self.target_key, self.score, self.seq_identity
        ));
        write_evalue(out, self.evalue);
        out.push_str(&format!(
            "\t{}\t{}\t{}\t{}\t{}\t{}",
            self.query_start,
            self.query_end,
            self.query_len,
            self.target_start,
            self.target_end,
            self.target_len
        ));
        if let (true, Some(orf)) = (add_orf_positions, &self.orf_positions) {
            out.push_str(&format!(
                "\t{}\t{}\t{}\t{}",
                orf.query_start, orf.query_end, orf.target_start, orf.target_end
            ));
        }
        out.push('\n');
    }

    /// Full line encoding, ORF positions included.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(64 + ORF_COLUMNS * 8);
        self.write_to(&mut line, true);
        line
    }
}

/// Write an e-value in C `%.3E` style: two-digit, signed exponent.
fn write_evalue(out: &mut String, evalue: f64) {
    let formatted = format!("{evalue:.3E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            out.push_str(&format!("{mantissa}E{sign}{digits:0>2}"));
        }
        None => out.push_str(&formatted),
    }
}

/// Split a newline-delimited block of record lines, skipping blank lines.
pub fn block_lines(data: &[u8]) -> Result<impl Iterator<Item = &str>, ParseErr> {
    let text = std::str::from_utf8(data).map_err(|_| ParseErr::InvalidUtf8)?;
    Ok(text.lines().filter(|line| !line.trim().is_empty()))
}
