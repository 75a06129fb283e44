//! Decoding of ORF headers into their location on the parent contig.

use crate::alignment_record::{AlignmentRecord, ParseErr};
use regex::Regex;
use std::sync::OnceLock;

/// Strand orientation of an ORF on its contig
#[derive(Default, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Strand {
    #[default]
    Plus,
    Minus,
}

/// Location of an ORF relative to the contig it was extracted from.
///
/// `from` and `to` follow the reading direction, so minus-strand ORFs
/// have `from > to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceLocation {
    /// Parent contig key, `None` when the header leaves it unset.
    pub id: Option<u32>,
    pub from: usize,
    pub to: usize,
    pub strand: Strand,
    pub has_incomplete_start: bool,
    pub has_incomplete_end: bool,
}

impl SequenceLocation {
    /// Parent contig key, falling back to the ORF's own key when unset.
    pub fn parent_key(&self, orf_key: u32) -> u32 {
        self.id.unwrap_or(orf_key)
    }

    /// ORF length in nucleotides.
    pub fn nucleotide_len(&self) -> usize {
        self.from.abs_diff(self.to) + 1
    }
}

const UNSET_ID: u32 = u32::MAX;

fn orf_token_regex() -> &'static Regex {
    static ORF_TOKEN: OnceLock<Regex> = OnceLock::new();
    ORF_TOKEN.get_or_init(|| {
        Regex::new(
            r"\[Orf:\s*([^,\]]*?)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(-?\d+)(?:\s*,\s*(\d+))?(?:\s*,\s*(\d+))?\s*\]",
        )
        .expect("ORF header pattern is valid")
    })
}

/// Parse the `[Orf: id, from, to, strand, incompleteStart, incompleteEnd]`
/// token out of an ORF header.
pub fn parse_orf_header(header: &[u8]) -> Result<SequenceLocation, ParseErr> {
    let text = std::str::from_utf8(header).map_err(|_| ParseErr::InvalidUtf8)?;
    let caps = orf_token_regex().captures(text).ok_or_else(|| {
        ParseErr::InvalidFormat(format!(
            "Could not find ORF information in header '{}'",
            text.trim_end()
        ))
    })?;

    let id = match &caps[1] {
        "" | "-" => None,
        raw => match raw.parse::<u32>().map_err(ParseErr::InvalidField)? {
            UNSET_ID => None,
            id => Some(id),
        },
    };
    let from = caps[2].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let to = caps[3].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let strand = match &caps[4] {
        "1" => Strand::Plus,
        "-1" => Strand::Minus,
        other => {
            return Err(ParseErr::InvalidFormat(format!(
                "Invalid ORF strand '{other}', expected 1 or -1"
            )))
        }
    };
    let flag = |idx: usize| caps.get(idx).is_some_and(|m| m.as_str() != "0");

    Ok(SequenceLocation {
        id,
        from,
        to,
        strand,
        has_incomplete_start: flag(5),
        has_incomplete_end: flag(6),
    })
}

/// Express an ORF's location as an alignment of the ORF onto its contig.
///
/// `target_key` is set to `contig_key`. Callers that regroup by contig pass
/// the ORF key instead, since the output record is already keyed by contig.
pub fn orf_to_contig(
    location: &SequenceLocation,
    contig_key: u32,
    contig_len: usize,
) -> Result<AlignmentRecord, ParseErr> {
    let coordinate = |value: usize| {
        i32::try_from(value).map_err(|_| {
            ParseErr::InvalidFormat(format!(
                "ORF coordinate {value} does not fit an alignment record"
            ))
        })
    };
    let orf_len = coordinate(location.nucleotide_len())?;
    Ok(AlignmentRecord {
        target_key: contig_key,
        score: 1,
        seq_identity: 1.0,
        evalue: 0.0,
        query_start: 0,
        query_end: orf_len - 1,
        query_len: orf_len,
        target_start: coordinate(location.from)?,
        target_end: coordinate(location.to)?,
        target_len: coordinate(contig_len)?,
        orf_positions: None,
        backtrace: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_header() {
        let loc = parse_orf_header(b"contig_7 [Orf: 3, 120, 450, 1, 0, 1]\n").unwrap();
        assert_eq!(
            loc,
            SequenceLocation {
                id: Some(3),
                from: 120,
                to: 450,
                strand: Strand::Plus,
                has_incomplete_start: false,
                has_incomplete_end: true,
            }
        );
        assert_eq!(loc.nucleotide_len(), 331);
        assert_eq!(loc.parent_key(99), 3);
    }

    #[test]
    fn test_unset_id_falls_back_to_own_key() {
        for header in [
            &b"orf [Orf: -, 10, 0, -1]"[..],
            &b"orf [Orf: 4294967295, 10, 0, -1, 1]"[..],
        ] {
            let loc = parse_orf_header(header).unwrap();
            assert_eq!(loc.id, None);
            assert_eq!(loc.strand, Strand::Minus);
            assert_eq!(loc.parent_key(17), 17);
            assert_eq!(parse_orf_header(header).unwrap(), loc);
        }
    }

    #[test]
    fn test_malformed_headers_are_errors() {
        assert!(parse_orf_header(b"just a name").is_err());
        assert!(parse_orf_header(b"x [Orf: 1, 2, 3, 0]").is_err());
        assert!(parse_orf_header(b"x [Orf: abc, 2, 3, 1]").is_err());
        assert!(parse_orf_header(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn test_orf_to_contig_record() {
        let loc = parse_orf_header(b"c [Orf: 2, 300, 100, -1, 0, 0]").unwrap();
        let record = orf_to_contig(&loc, 2, 1000).unwrap();
        assert_eq!(record.target_key, 2);
        assert_eq!((record.query_start, record.query_end, record.query_len), (0, 200, 201));
        assert_eq!((record.target_start, record.target_end, record.target_len), (300, 100, 1000));
        assert_eq!(
            record.to_line(),
            "2\t1\t1.000\t0.000E+00\t0\t200\t201\t300\t100\t1000\n"
        );
    }

    #[test]
    fn test_orf_to_contig_rejects_oversized_coordinates() {
        let loc = parse_orf_header(b"c [Orf: 2, 0, 3000000000, 1, 0, 0]").unwrap();
        assert!(matches!(
            orf_to_contig(&loc, 2, 4_000_000_000),
            Err(ParseErr::InvalidFormat(_))
        ));

        let loc = parse_orf_header(b"c [Orf: 2, 0, 99, 1, 0, 0]").unwrap();
        assert!(orf_to_contig(&loc, 2, 3_000_000_000).is_err());
        assert!(orf_to_contig(&loc, 2, 100).is_ok());
    }
}
