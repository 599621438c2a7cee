use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{Level, debug, warn};
use walkdir::WalkDir;

use pakmap::codec::{
    STRATEGY_MAX, STRATEGY_MIN, compress_level_range, default_compress_level, strategy_help,
};
use pakmap::{
    Archive, DEFAULT_LOAD_FACTOR, FileMapping, PakError, WORD_LEN, Xxh3Hasher, ZstdCompressor,
    ZstdDecompressor, build_archive,
};

#[derive(Parser)]
#[command(
    name = "pakmap",
    about = "Builds and extracts memory-mappable compressed asset archives",
    version
)]
struct Cli {
    /// Archive file to create or read
    file: PathBuf,

    /// Source directory when packing, destination when extracting; with
    /// --info it is only used to report the size reduction
    dir: Option<PathBuf>,

    /// Print archive statistics instead of packing or extracting
    #[arg(short, long, conflicts_with = "decompress")]
    info: bool,

    /// Extract instead of pack
    #[arg(short = 'x', long)]
    decompress: bool,

    /// Overwrite the target archive when packing, or existing files when
    /// extracting
    #[arg(short, long)]
    force: bool,

    /// When extracting, skip files that already exist instead of aborting
    #[arg(short = 'e', long, requires = "decompress")]
    skip_existing: bool,

    /// Extract a single entry by name into DIR
    #[arg(short, long, value_name = "NAME", requires = "decompress")]
    onefile: Option<String>,

    /// Dictionary sidecar file. Read and reused when it exists, otherwise
    /// trained from DIR and written out. The dictionary is also embedded in
    /// the archive, so extraction never needs the sidecar.
    #[arg(short, long, value_name = "PATH", conflicts_with = "decompress")]
    dictionary: Option<PathBuf>,

    /// Retrain the dictionary even if the sidecar file exists
    #[arg(short, long, requires = "dictionary")]
    rebuild_dictionary: bool,

    /// Compression level; negative levels favor speed over size. Cannot be
    /// combined with reusing an existing dictionary, which pins the level
    /// it was trained with.
    #[arg(short, long, conflicts_with = "decompress")]
    level: Option<i32>,

    /// Compression strategy
    #[arg(short, long, default_value_t = 0, conflicts_with = "decompress", long_help = strategy_help())]
    strategy: i32,

    /// Desired dictionary size as a fraction of the total input; 0.01 means
    /// a dictionary 1% of the source bytes
    #[arg(short = 't', long, value_name = "RATIO", default_value_t = ZstdCompressor::DEFAULT_DICT_RATIO)]
    dictionary_ratio: f64,

    /// Desired ratio of files to hash buckets. Lower values mean shorter
    /// bucket chains at the cost of a larger offset table.
    #[arg(short, long, value_name = "RATIO", default_value_t = DEFAULT_LOAD_FACTOR)]
    bucket_factor: f64,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Exit code 1 for anything wrong with the invocation itself.
            let _ = err.print();
            process::exit(1);
        }
    };
    if let Err(msg) = validate(&cli) {
        eprintln!("Error: {msg}");
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    let result = if cli.info {
        info(&cli)
    } else if cli.decompress {
        extract(&cli)
    } else {
        pack(&cli)
    };
    if let Err(err) = result {
        eprintln!("Error: {err}");
        process::exit(2);
    }
}

/// Argument checks beyond what the flag relations express.
fn validate(cli: &Cli) -> Result<(), String> {
    if let Some(level) = cli.level {
        let range = compress_level_range();
        if !range.contains(&level) {
            return Err(format!(
                "compression level {level} out of range ({}..={})",
                range.start(),
                range.end()
            ));
        }
        if let Some(dict) = &cli.dictionary {
            if dict.exists() && !cli.rebuild_dictionary {
                return Err(
                    "cannot set a compression level while reusing a dictionary; \
                     retrain it with --rebuild-dictionary"
                        .into(),
                );
            }
        }
    }
    if !(STRATEGY_MIN..=STRATEGY_MAX).contains(&cli.strategy) {
        return Err(format!(
            "compression strategy {} out of range ({STRATEGY_MIN}..={STRATEGY_MAX})",
            cli.strategy
        ));
    }
    if !cli.info && cli.dir.is_none() {
        return Err(if cli.decompress {
            "extracting needs a destination directory".into()
        } else {
            "packing needs a source directory".into()
        });
    }
    if !cli.info && !cli.decompress {
        if let Some(dir) = cli.dir.as_deref() {
            if !dir.is_dir() {
                return Err(format!("{} is not a directory", dir.display()));
            }
        }
    }
    Ok(())
}

fn target_dir(cli: &Cli) -> Result<&Path, PakError> {
    cli.dir
        .as_deref()
        .ok_or_else(|| PakError::Usage("no directory given".into()))
}

fn pack(cli: &Cli) -> Result<(), PakError> {
    let dir = target_dir(cli)?;
    if cli.file.exists() {
        if !cli.force {
            return Err(PakError::Usage(format!(
                "{} already exists; pass --force or delete it first",
                cli.file.display()
            )));
        }
        fs::remove_file(&cli.file)?;
    }

    let hasher = Xxh3Hasher::new(cli.bucket_factor);
    let level = cli.level.unwrap_or_else(default_compress_level);
    let mut comp = ZstdCompressor::with_dict_ratio(level, cli.dictionary_ratio)?;
    comp.set_strategy(cli.strategy)?;
    if let Some(sidecar) = &cli.dictionary {
        setup_dictionary(cli, sidecar, dir, &mut comp)?;
    }

    let mut mapper = FileMapping::create(&cli.file)?;
    build_archive(dir, &hasher, &mut mapper, &mut comp)
}

/// Reuses the sidecar dictionary when present, otherwise trains one from
/// the source tree and writes it out. Training is expensive, which is the
/// whole point of keeping the sidecar around.
fn setup_dictionary(
    cli: &Cli,
    sidecar: &Path,
    dir: &Path,
    comp: &mut ZstdCompressor,
) -> Result<(), PakError> {
    use pakmap::Compressor as _;

    if !cli.rebuild_dictionary && sidecar.exists() {
        let bytes = fs::read(sidecar)?;
        comp.use_dictionary(&bytes)?;
        debug!(len = bytes.len(), "reusing dictionary sidecar");
        return Ok(());
    }
    if comp.train_dictionary(dir)? {
        if let Some(dict) = comp.dictionary() {
            fs::write(sidecar, dict)?;
        }
    } else if sidecar.exists() {
        let bytes = fs::read(sidecar)?;
        comp.use_dictionary(&bytes)?;
    } else {
        warn!("dictionary training produced nothing; packing without one");
    }
    Ok(())
}

fn open_archive(
    cli: &Cli,
) -> Result<Archive<FileMapping, ZstdDecompressor, Xxh3Hasher>, PakError> {
    let mapper = FileMapping::open(&cli.file)?;
    Archive::open(
        mapper,
        ZstdDecompressor::new()?,
        Xxh3Hasher::new(cli.bucket_factor),
    )
}

fn extract(cli: &Cli) -> Result<(), PakError> {
    let dir = target_dir(cli)?;
    let archive = open_archive(cli)?;

    if let Some(name) = &cli.onefile {
        let entry = archive
            .lookup(name)?
            .ok_or_else(|| PakError::Usage(format!("{name} not found in the archive")))?;
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| PakError::Usage(format!("{name} is not a file name")))?;
        let dest = dir.join(file_name);
        if dest.exists() && !cli.force {
            return Err(PakError::Usage(format!(
                "{} already exists; pass --force or delete it",
                dest.display()
            )));
        }
        fs::write(&dest, entry.retrieve()?)?;
        return Ok(());
    }

    for bucket in archive.buckets() {
        for entry in bucket?.entries() {
            let entry = entry?;
            let dest = dir.join(entry.name());
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            if dest.exists() {
                if cli.skip_existing {
                    continue;
                }
                if !cli.force {
                    return Err(PakError::Usage(format!(
                        "{} already exists and neither --force nor --skip-existing was given",
                        dest.display()
                    )));
                }
            }
            fs::write(&dest, entry.retrieve()?)?;
        }
    }
    Ok(())
}

/// Everything the info report prints about the archive itself.
struct InfoReport {
    buckets: usize,
    unused: usize,
    used: usize,
    dictionary_bytes: usize,
    archive_bytes: usize,
    files: usize,
    smallest: usize,
    largest: usize,
    /// Bucket length mapped to how many buckets have that length.
    distribution: BTreeMap<usize, usize>,
}

fn survey(
    archive: &Archive<FileMapping, ZstdDecompressor, Xxh3Hasher>,
) -> Result<InfoReport, PakError> {
    let buckets = archive.bucket_count();
    let mut used = 0usize;
    let mut files = 0usize;
    let mut smallest = usize::MAX;
    let mut largest = 0usize;
    let mut distribution: BTreeMap<usize, usize> = BTreeMap::new();
    for bucket in archive.buckets() {
        let mut len = 0usize;
        for entry in bucket?.entries() {
            entry?;
            len += 1;
        }
        if len > 0 {
            used += 1;
            files += len;
            smallest = smallest.min(len);
            largest = largest.max(len);
            *distribution.entry(len).or_default() += 1;
        }
    }
    Ok(InfoReport {
        buckets,
        unused: buckets - used,
        used,
        dictionary_bytes: archive.dictionary_size(),
        archive_bytes: archive.size(),
        files,
        smallest: if used > 0 { smallest } else { 0 },
        largest,
        distribution,
    })
}

fn info(cli: &Cli) -> Result<(), PakError> {
    let archive = open_archive(cli)?;
    let report = survey(&archive)?;

    println!("Total Buckets: {}", report.buckets);
    println!("Total Unused: {}", report.unused);
    println!("Total Used: {}", report.used);
    println!("Dictionary Bytes: {}", report.dictionary_bytes);
    println!("Total Files: {}", report.files);
    if report.used > 0 {
        println!("Smallest Bucket: {}", report.smallest);
        println!("Largest Bucket: {}", report.largest);
        println!(
            "Usage Ratio: {:.1}%",
            100.0 * report.used as f64 / report.buckets as f64
        );
        println!("Bytes Wasted: {}", report.unused * WORD_LEN);
        println!(
            "Average (Mean) Load: {:.2}",
            report.files as f64 / report.used as f64
        );
        println!("Distribution:");
        for (len, count) in &report.distribution {
            println!(
                "  {count} bucket{} with {len} element{}",
                if *count == 1 { "" } else { "s" },
                if *len == 1 { "" } else { "s" },
            );
        }
    }
    println!("Total Archive Bytes: {}", report.archive_bytes);

    if let Some(dir) = cli.dir.as_deref().filter(|d| d.is_dir()) {
        let mut source_bytes = 0u64;
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() {
                source_bytes += entry.metadata().map_err(std::io::Error::from)?.len();
            }
        }
        println!("Total Dir Bytes: {source_bytes}");
        if source_bytes > 0 {
            println!(
                "Size Reduction: {:.1}%",
                100.0 * (1.0 - report.archive_bytes as f64 / source_bytes as f64)
            );
        }
    }
    Ok(())
}
