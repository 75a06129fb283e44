//! Regroup ORF alignments by the contig the ORFs were extracted from.
//!
//! For every contig, each alignment of one of its ORFs against a target is
//! paired with the ORF's own location on the contig. Pairs are ordered by
//! target key, then ORF key, and written as one record keyed by the contig:
//! `<ORF-to-target alignment>\t<ORF-to-contig location>` per line.

use crate::alignment_record::{block_lines, AlignmentRecord};
use crate::commands::{build_thread_pool, current_shard, worker_count};
use crate::contig_index::{contig_membership, resolve_orf_parents, ContigOrfIndex, UNRESOLVED};
use crate::orf::{orf_to_contig, parse_orf_header};
use crate::progress::Progress;
use crate::store::{DbType, RecordReader, RecordWriter};
use log::{debug, info};
use rayon::prelude::*;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// (ORF-to-target alignment, ORF-to-contig location)
type AlignmentPair = (AlignmentRecord, AlignmentRecord);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregationSummary {
    pub orfs_indexed: usize,
    /// ORF keys without a header
    pub orfs_unresolved: usize,
    /// ORFs whose parent key is beyond the largest contig key
    pub orfs_without_contig: usize,
    pub contigs_written: usize,
    pub pairs_written: usize,
}

/// Per-worker buffers, reused from one contig to the next.
#[derive(Default)]
struct Scratch {
    pairs: Vec<AlignmentPair>,
    buffer: String,
}

/// Open the input stores, aggregate every contig and write the output store.
pub fn run_results_per_contig(
    contigs_path: &Path,
    orf_headers_path: &Path,
    alignments_path: &Path,
    output_path: &Path,
    num_threads: NonZeroUsize,
) -> io::Result<AggregationSummary> {
    let contigs = RecordReader::open(contigs_path)?;
    let orf_headers = RecordReader::open(orf_headers_path)?;
    let alignments = RecordReader::open(alignments_path)?;

    let threads = worker_count(num_threads, contigs.len());
    let pool = build_thread_pool(threads)?;
    info!(
        "Aggregating {} contigs, {} ORF headers, {} alignment blocks with {} threads",
        contigs.len(),
        orf_headers.len(),
        alignments.len(),
        threads
    );

    let writer = RecordWriter::create(output_path, threads, DbType::AlignmentResult)?;
    let summary = pool.install(|| aggregate(&contigs, &orf_headers, &alignments, &writer))?;
    writer.close()?;

    info!(
        "Wrote {} pairs for {} contigs to '{}'",
        summary.pairs_written,
        summary.contigs_written,
        output_path.display()
    );
    Ok(summary)
}

/// Aggregate on the current rayon pool, writing to the shard of each worker.
pub fn aggregate(
    contigs: &RecordReader,
    orf_headers: &RecordReader,
    alignments: &RecordReader,
    writer: &RecordWriter,
) -> io::Result<AggregationSummary> {
    let timer = Instant::now();
    info!("Computing ORF lookup");
    let parents = resolve_orf_parents(orf_headers)?;
    let orfs_unresolved = parents.par_iter().filter(|&&p| p == UNRESOLVED).count();

    info!("Computing contig offsets");
    let max_contig_key = contigs.last_key();
    let index = ContigOrfIndex::build(&parents, max_contig_key);
    let orfs_without_contig = parents.len() - orfs_unresolved - index.orf_count();
    drop(parents);
    let exists = contig_membership(contigs, index.contig_slots());
    info!("Time for contig lookup: {:.2?}", timer.elapsed());
    debug!(
        "Indexed {} ORFs over {} contig slots ({} ORF keys unresolved, {} beyond the last contig)",
        index.orf_count(),
        index.contig_slots(),
        orfs_unresolved,
        orfs_without_contig
    );

    let entry_count = max_contig_key.map_or(0, |key| key as usize + 1);
    let progress = Progress::new("Contigs processed", entry_count);
    let contigs_written = AtomicUsize::new(0);
    let pairs_written = AtomicUsize::new(0);

    (0..entry_count).into_par_iter().try_for_each_init(
        Scratch::default,
        |scratch, contig| -> io::Result<()> {
            progress.tick();
            if !exists[contig] {
                return Ok(());
            }
            let contig_key = contig as u32;

            scratch.pairs.clear();
            scratch.buffer.clear();
            collect_contig_pairs(
                contig_key,
                &index,
                contigs,
                orf_headers,
                alignments,
                &mut scratch.pairs,
            )?;
            if scratch.pairs.is_empty() {
                return Ok(());
            }

            write_pairs(&scratch.pairs, &mut scratch.buffer);
            writer.write(contig_key, scratch.buffer.as_bytes(), current_shard())?;

            contigs_written.fetch_add(1, Ordering::Relaxed);
            pairs_written.fetch_add(scratch.pairs.len(), Ordering::Relaxed);
            Ok(())
        },
    )?;

    Ok(AggregationSummary {
        orfs_indexed: index.orf_count(),
        orfs_unresolved,
        orfs_without_contig,
        contigs_written: contigs_written.into_inner(),
        pairs_written: pairs_written.into_inner(),
    })
}

/// Gather the alignment pairs of every ORF of `contig_key` into `pairs`,
/// ordered by target key, then ORF key. Equal keys keep their block order.
fn collect_contig_pairs(
    contig_key: u32,
    index: &ContigOrfIndex,
    contigs: &RecordReader,
    orf_headers: &RecordReader,
    alignments: &RecordReader,
    pairs: &mut Vec<AlignmentPair>,
) -> io::Result<()> {
    let contig_len = contigs.id_of(contig_key).map_or(0, |id| contigs.seq_len(id));

    for &orf_key in index.orfs_of(contig_key) {
        let Some(header) = orf_headers.get(orf_key) else {
            continue;
        };
        let location = parse_orf_header(header)?;
        // Keyed by the ORF: the output record itself is keyed by the contig
        let orf_location = orf_to_contig(&location, orf_key, contig_len)?;

        let Some(block) = alignments.get(orf_key) else {
            continue;
        };
        for line in block_lines(block)? {
            pairs.push((AlignmentRecord::parse_line(line)?, orf_location.clone()));
        }
    }

    pairs.sort_by(|(a_target, a_orf), (b_target, b_orf)| {
        a_target
            .target_key
            .cmp(&b_target.target_key)
            .then(a_orf.target_key.cmp(&b_orf.target_key))
    });
    Ok(())
}

fn write_pairs(pairs: &[AlignmentPair], out: &mut String) {
    for (orf_to_target, orf_location) in pairs {
        orf_to_target.write_to(out, false);
        out.pop();
        out.push('\t');
        orf_location.write_to(out, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, name: &str, entries: &[(u32, &str)]) -> RecordReader {
        let path = dir.path().join(name);
        let writer = RecordWriter::create(&path, 2, DbType::Generic).unwrap();
        for (i, (key, payload)) in entries.iter().enumerate() {
            writer.write(*key, payload.as_bytes(), i).unwrap();
        }
        writer.close().unwrap();
        RecordReader::open(&path).unwrap()
    }

    fn hit(target: u32, score: i32) -> String {
        format!("{target}\t{score}\t0.900\t1.000E-05\t0\t9\t10\t0\t9\t50\n")
    }

    #[test]
    fn test_pairs_sorted_by_target_then_orf_and_stable() {
        let dir = TempDir::new().unwrap();
        let contigs = store(&dir, "contigs", &[(0, "ACGTACGTAC\n")]);
        let headers = store(
            &dir,
            "headers",
            &[
                (4, "a [Orf: 0, 0, 8, 1, 0, 0]\n"),
                (2, "b [Orf: 0, 9, 1, -1, 0, 0]\n"),
            ],
        );
        let block_4 = [hit(7, 30), hit(3, 10), hit(7, 20)].concat();
        let block_2 = [hit(7, 99), hit(1, 5)].concat();
        let alignments = store(&dir, "aln", &[(4, block_4.as_str()), (2, block_2.as_str())]);

        // Scatter order within a run is arbitrary
        let index = ContigOrfIndex::build(&[UNRESOLVED, UNRESOLVED, 0, UNRESOLVED, 0], Some(0));
        let mut pairs = Vec::new();
        collect_contig_pairs(0, &index, &contigs, &headers, &alignments, &mut pairs).unwrap();

        let order: Vec<(u32, u32, i32)> = pairs
            .iter()
            .map(|(aln, loc)| (aln.target_key, loc.target_key, aln.score))
            .collect();
        assert_eq!(
            order,
            vec![(1, 2, 5), (3, 4, 10), (7, 2, 99), (7, 4, 30), (7, 4, 20)]
        );
        assert_eq!(pairs[0].1.target_len, 10);
    }

    #[test]
    fn test_write_pairs_joins_with_tab() {
        let aln = AlignmentRecord::parse_line(&hit(5, 12)).unwrap();
        let loc =
            AlignmentRecord::parse_line("10\t1\t1.000\t0.000E+00\t0\t29\t30\t0\t29\t100")
                .unwrap();
        let mut out = String::new();
        write_pairs(&[(aln.clone(), loc.clone()), (aln, loc)], &mut out);

        let line = "5\t12\t0.900\t1.000E-05\t0\t9\t10\t0\t9\t50\t10\t1\t1.000\t0.000E+00\t0\t29\t30\t0\t29\t100\n";
        assert_eq!(out, format!("{line}{line}"));
    }

    #[test]
    fn test_orf_without_header_or_alignments_is_skipped() {
        let dir = TempDir::new().unwrap();
        let contigs = store(&dir, "contigs", &[(1, "ACGT\n")]);
        let headers = store(&dir, "headers", &[(0, "x [Orf: 1, 0, 2, 1, 0, 0]\n")]);
        let alignments = store(&dir, "aln", &[(3, hit(2, 1).as_str())]);

        // orf 3 is indexed but has no header, orf 0 has no alignments
        let index = ContigOrfIndex::build(&[1, UNRESOLVED, UNRESOLVED, 1], Some(1));
        let mut pairs = Vec::new();
        collect_contig_pairs(1, &index, &contigs, &headers, &alignments, &mut pairs).unwrap();
        assert!(pairs.is_empty());
    }
}
