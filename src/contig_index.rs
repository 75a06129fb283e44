//! Contig -> ORF lookup.
//!
//! Every ORF header names its parent contig. [`resolve_orf_parents`] decodes
//! those into a flat ORF -> contig array, and [`ContigOrfIndex::build`] inverts
//! it into an offsets array plus a flat ORF array grouped by contig, so the
//! ORFs of contig `c` are `orfs[offsets[c]..offsets[c + 1]]`.

use crate::orf::parse_orf_header;
use crate::store::RecordReader;
use rayon::prelude::*;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Parent slot of an ORF key that has no header.
pub const UNRESOLVED: u32 = u32::MAX;

/// Decode the parent contig of every ORF key in `0..=last key` of the header
/// store. Keys missing from the store map to [`UNRESOLVED`]; headers without
/// an explicit parent map to the ORF's own key.
pub fn resolve_orf_parents(orf_headers: &RecordReader) -> io::Result<Vec<u32>> {
    let Some(max_orf_key) = orf_headers.last_key() else {
        return Ok(Vec::new());
    };

    (0..max_orf_key as usize + 1)
        .into_par_iter()
        .with_min_len(1024)
        .map(|orf_key| -> io::Result<u32> {
            let orf_key = orf_key as u32;
            match orf_headers.id_of(orf_key) {
                None => Ok(UNRESOLVED),
                Some(id) => {
                    let location = parse_orf_header(orf_headers.data(id))?;
                    Ok(location.parent_key(orf_key))
                }
            }
        })
        .collect()
}

/// Offsets + flat array index from contig key to the keys of its ORFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigOrfIndex {
    offsets: Vec<usize>,
    orfs: Vec<u32>,
}

impl ContigOrfIndex {
    /// Build the index from an ORF -> parent array.
    ///
    /// The index covers contig keys `0..=max_contig_key`. Parents above
    /// `max_contig_key` cannot be contigs and are left out, as are
    /// [`UNRESOLVED`] slots. Parents within range are not checked for
    /// existence.
    pub fn build(parents: &[u32], max_contig_key: Option<u32>) -> Self {
        let Some(max_contig_key) = max_contig_key else {
            return ContigOrfIndex {
                offsets: vec![0],
                orfs: Vec::new(),
            };
        };
        let slots = max_contig_key as usize + 1;
        let indexed = |parent: u32| parent != UNRESOLVED && parent <= max_contig_key;

        // Count
        let counts: Vec<AtomicUsize> = (0..=slots).map(|_| AtomicUsize::new(0)).collect();
        parents
            .par_iter()
            .filter(|&&parent| indexed(parent))
            .for_each(|&parent| {
                counts[parent as usize].fetch_add(1, Ordering::Relaxed);
            });

        // Prefix sum, in place: offsets[c] = number of ORFs of contigs < c
        let mut offsets: Vec<usize> = counts.into_iter().map(AtomicUsize::into_inner).collect();
        let mut running = 0;
        for slot in offsets.iter_mut() {
            let count = *slot;
            *slot = running;
            running += count;
        }
        let total = running;

        // Scatter: each ORF claims the next free slot of its contig's run
        let cursors: Vec<AtomicUsize> = offsets.into_iter().map(AtomicUsize::new).collect();
        let flat: Vec<AtomicU32> = (0..total).map(|_| AtomicU32::new(0)).collect();
        parents
            .par_iter()
            .enumerate()
            .filter(|&(_, &parent)| indexed(parent))
            .for_each(|(orf_key, &parent)| {
                let slot = cursors[parent as usize].fetch_add(1, Ordering::Relaxed);
                flat[slot].store(orf_key as u32, Ordering::Relaxed);
            });

        // Each cursor now points at the start of the following run
        let mut offsets: Vec<usize> = cursors.into_iter().map(AtomicUsize::into_inner).collect();
        offsets.copy_within(0..slots, 1);
        offsets[0] = 0;

        ContigOrfIndex {
            offsets,
            orfs: flat.into_iter().map(AtomicU32::into_inner).collect(),
        }
    }

    /// Number of contig keys the index has a run for.
    pub fn contig_slots(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of indexed ORFs
    pub fn orf_count(&self) -> usize {
        self.orfs.len()
    }

    /// Keys of the ORFs of `contig_key`, in no particular order.
    pub fn orfs_of(&self, contig_key: u32) -> &[u32] {
        let contig = contig_key as usize;
        if contig >= self.contig_slots() {
            return &[];
        }
        &self.orfs[self.offsets[contig]..self.offsets[contig + 1]]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn orfs(&self) -> &[u32] {
        &self.orfs
    }
}

/// Existence flags for contig keys `0..slots`.
pub fn contig_membership(contigs: &RecordReader, slots: usize) -> Vec<bool> {
    let mut exists = vec![false; slots];
    for key in contigs.keys() {
        if let Some(flag) = exists.get_mut(key as usize) {
            *flag = true;
        }
    }
    exists
}
