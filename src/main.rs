use clap::Parser;
use contigorf::commands::orf_to_contig::run_orf_to_contig;
use contigorf::commands::results_per_contig::run_results_per_contig;
use log::info;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN))]
    threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Join ORF search results back to the contigs the ORFs were extracted from.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Regroup ORF-to-target alignments by contig, pairing each with the ORF's location on the contig
    ResultsPerContig {
        #[clap(flatten)]
        common: CommonOpts,

        /// Contig sequence store
        contigs: PathBuf,

        /// ORF header store
        orf_headers: PathBuf,

        /// ORF-to-target alignment store
        alignments: PathBuf,

        /// Output store, keyed by contig
        output: PathBuf,
    },
    /// Write the location of every ORF on its contig in alignment format
    OrfToContig {
        #[clap(flatten)]
        common: CommonOpts,

        /// Contig sequence store
        contigs: PathBuf,

        /// ORF header store
        orf_headers: PathBuf,

        /// Output store, keyed by ORF
        output: PathBuf,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::ResultsPerContig {
            common,
            contigs,
            orf_headers,
            alignments,
            output,
        } => {
            init_logger(&common);
            let summary = run_results_per_contig(
                &contigs,
                &orf_headers,
                &alignments,
                &output,
                common.threads,
            )?;
            info!(
                "{} ORFs indexed, {} ORF keys without header, {} ORFs beyond the last contig",
                summary.orfs_indexed, summary.orfs_unresolved, summary.orfs_without_contig
            );
        }
        Args::OrfToContig {
            common,
            contigs,
            orf_headers,
            output,
        } => {
            init_logger(&common);
            run_orf_to_contig(&contigs, &orf_headers, &output, common.threads)?;
        }
    }

    Ok(())
}

fn init_logger(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();
}
