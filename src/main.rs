use anyhow::Result;
use clap::{Parser, Subcommand};
use crush::{init_tracing_once, Crush, CrushOptions, GrepFlags, SplitTarget, DEFAULT_BUCKET};
use std::io;
use std::path::PathBuf;

/// Field-level transforms over delimited text streams.
///
/// Reads rows from stdin (or `--input`), writes rows to stdout. A field
/// selector is a comma separated list of field names, 1-based positions and
/// ranges such as `2-4`, `-3` or `5-`. Naming a field by its header cell makes
/// the first row a header.
#[derive(Parser)]
#[command(name = "crush", version)]
struct Cli {
    /// Field delimiter (`\t` or `tab` for TAB)
    #[arg(short, long, default_value = ",", value_parser = parse_delim)]
    delim: char,

    /// Never treat the first row as a header
    #[arg(short = 'N', long)]
    no_header: bool,

    /// Always treat the first row as a header
    #[arg(long = "header")]
    force_header: bool,

    /// Input file (`-` for stdin); `.zst` files are decompressed
    #[arg(short = 'I', long)]
    input: Option<PathBuf>,

    /// Show a row counter on stderr
    #[arg(long)]
    progress: bool,

    /// Most bucket files `split` keeps open at once
    #[arg(long, default_value_t = 512)]
    max_open_files: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep and permute columns
    Reorder {
        #[arg(short, long)]
        fields: String,
    },
    /// Insert literal columns
    Addfield {
        /// Insertion points
        #[arg(short, long)]
        idxs: String,
        /// One value per insertion point
        #[arg(short, long, value_delimiter = ',', required = true)]
        values: Vec<String>,
        /// Header labels; implies the first row is a header
        #[arg(short = 'H', long, value_delimiter = ',')]
        headers: Option<Vec<String>>,
    },
    /// Keep rows whose fields match regular expressions
    Grep {
        /// Keep rows that do not match
        #[arg(short = 'v', long)]
        invert: bool,
        #[arg(short, long)]
        icase: bool,
        /// Any field may match (default: all must)
        #[arg(short, long)]
        anyfield: bool,
        #[arg(short, long)]
        fields: String,
        /// One pattern per selected field
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Partition rows into bucket files
    Split {
        /// Arguments to the bucket function
        #[arg(short, long)]
        fields: String,
        /// Bucket function, e.g. `x, y: x + '-' + y`
        #[arg(short, long, default_value = DEFAULT_BUCKET)]
        bucket: String,
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Copy the first row to the top of every bucket file
        #[arg(short = 'H', long)]
        copy_headers: bool,
        /// Output filename pattern; % is the bucket key
        #[arg(short, long, default_value = "%")]
        outpat: String,
    },
    /// Append computed columns, e.g. `int([amount]) * 2`
    Calc {
        /// Header labels; implies the first row is a header
        #[arg(short = 'H', long, value_delimiter = ',')]
        headers: Option<Vec<String>>,
        #[arg(required = true)]
        exprs: Vec<String>,
    },
}

fn parse_delim(s: &str) -> Result<char, String> {
    match s {
        "\\t" | "tab" | "TAB" => return Ok('\t'),
        _ => {}
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("delimiter must be a single character, got '{}'", s)),
    }
}

fn is_broken_pipe(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|c| c.downcast_ref::<io::Error>())
        .any(|io| io.kind() == io::ErrorKind::BrokenPipe)
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();

    let opts = CrushOptions::default()
        .with_delimiter(cli.delim)
        .with_no_header(cli.no_header)
        .with_force_header(cli.force_header)
        .with_max_open_files(cli.max_open_files)
        .with_progress(cli.progress);
    let mut crush = Crush::with_options(opts);
    if let Some(path) = &cli.input {
        crush = crush.input(path).progress_label(path.display().to_string());
    }

    let stdout = io::stdout().lock();
    let result = match cli.command {
        Command::Reorder { fields } => crush.reorder(&fields, stdout).map(drop),
        Command::Addfield { idxs, values, headers } => {
            crush.add_fields(&idxs, &values, headers.as_deref(), stdout).map(drop)
        }
        Command::Grep { invert, icase, anyfield, fields, patterns } => {
            let flags = GrepFlags { invert, ignore_case: icase, any_field: anyfield };
            crush.grep(&fields, &patterns, flags, stdout).map(drop)
        }
        Command::Split { fields, bucket, path, copy_headers, outpat } => {
            let target = SplitTarget::new(path).with_pattern(outpat).with_copy_headers(copy_headers);
            crush.split(&fields, Some(bucket.as_str()), &target).map(|summary| {
                tracing::info!("{} row(s) in {} bucket(s)", summary.rows, summary.buckets);
            })
        }
        Command::Calc { headers, exprs } => crush.calc(&exprs, headers.as_deref(), stdout).map(drop),
    };

    match result {
        Err(e) if is_broken_pipe(&e) => Ok(()),
        other => other,
    }
}
