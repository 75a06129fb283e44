//! Write the location of every ORF on its contig in alignment-record form.

use crate::commands::{build_thread_pool, current_shard, worker_count};
use crate::orf::{orf_to_contig, parse_orf_header};
use crate::progress::Progress;
use crate::store::{DbType, RecordReader, RecordWriter};
use log::{debug, info};
use rayon::prelude::*;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One output record per ORF header, keyed by ORF key and holding the
/// ORF-to-contig location keyed by the parent contig. ORFs whose contig is
/// not in the contig store are left out. Returns the number of records written.
pub fn run_orf_to_contig(
    contigs_path: &Path,
    orf_headers_path: &Path,
    output_path: &Path,
    num_threads: NonZeroUsize,
) -> io::Result<usize> {
    let contigs = RecordReader::open(contigs_path)?;
    let orf_headers = RecordReader::open(orf_headers_path)?;

    let threads = worker_count(num_threads, orf_headers.len());
    let pool = build_thread_pool(threads)?;
    let writer = RecordWriter::create(output_path, threads, DbType::AlignmentResult)?;

    let progress = Progress::new("ORFs processed", orf_headers.len());
    let written = AtomicUsize::new(0);
    let orphaned = AtomicUsize::new(0);

    pool.install(|| {
        (0..orf_headers.len()).into_par_iter().try_for_each_init(
            String::new,
            |buffer, id| -> io::Result<()> {
                progress.tick();
                let orf_key = orf_headers.key_at(id);
                let location = parse_orf_header(orf_headers.data(id))?;
                let contig_key = location.parent_key(orf_key);
                let Some(contig_id) = contigs.id_of(contig_key) else {
                    orphaned.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                };

                buffer.clear();
                orf_to_contig(&location, contig_key, contigs.seq_len(contig_id))?
                    .write_to(buffer, false);
                writer.write(orf_key, buffer.as_bytes(), current_shard())?;
                written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )
    })?;
    writer.close()?;

    let orphaned = orphaned.into_inner();
    if orphaned > 0 {
        debug!("Skipped {orphaned} ORFs whose contig is not in the contig store");
    }
    let written = written.into_inner();
    info!("Wrote {} ORF locations to '{}'", written, output_path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_orf_locations_written_per_orf() {
        let dir = TempDir::new().unwrap();
        let contigs = dir.path().join("contigs");
        let headers = dir.path().join("headers");
        let output = dir.path().join("out");

        let writer = RecordWriter::create(&contigs, 1, DbType::Nucleotides).unwrap();
        writer.write(1, b"ACGTACGTACGTACGTACGT\n", 0).unwrap();
        writer.close().unwrap();

        let writer = RecordWriter::create(&headers, 2, DbType::Headers).unwrap();
        writer.write(10, b"c1 [Orf: 1, 2, 10, 1, 0, 0]\n", 0).unwrap();
        writer.write(11, b"c1 [Orf: 1, 19, 5, -1, 0, 1]\n", 1).unwrap();
        // Own key 12 is not a contig
        writer.write(12, b"x [Orf: -, 0, 3, 1]\n", 0).unwrap();
        writer.close().unwrap();

        let written =
            run_orf_to_contig(&contigs, &headers, &output, NonZeroUsize::new(4).unwrap()).unwrap();
        assert_eq!(written, 2);

        let out = RecordReader::open(&output).unwrap();
        assert_eq!(out.dbtype(), DbType::AlignmentResult);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(
            out.get(10),
            Some(&b"1\t1\t1.000\t0.000E+00\t0\t8\t9\t2\t10\t20\n"[..])
        );
        assert_eq!(
            out.get(11),
            Some(&b"1\t1\t1.000\t0.000E+00\t0\t14\t15\t19\t5\t20\n"[..])
        );
    }
}
