//! LDBM command-line tool
//!
//! Inspect and edit dbm-style stores through the ldbm facade.
//!
//! # Examples
//!
//! ```bash
//! # Store and read back a value
//! ldbm put users.db alice admin --replace
//! ldbm get users.db alice
//!
//! # Reclaim space after many deletes
//! ldbm --backend gdbm reorganize users.db
//!
//! # Copy a store into another backend
//! ldbm --backend gdbm dump users.db > users.tsv
//! ldbm --backend ndbm load users.ndbm --input users.tsv
//! ```

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ldbm::{BackendKind, Datum, Ldbm, LdbmConfig, OpenMode, StoreFlags};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// LDBM - one key/value interface over dbm-style backends
#[derive(Parser, Debug)]
#[command(name = "ldbm")]
#[command(version = ldbm::VERSION)]
#[command(about = "Inspect and edit dbm-style key/value stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend to use (berkeley-v1, berkeley-v2, gdbm, mdbm, ndbm)
    #[arg(long, global = true, env = "LDBM_BACKEND")]
    backend: Option<BackendKind>,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "LDBM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "LDBM_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value stored under a key
    Get {
        db: PathBuf,
        key: String,
    },
    /// Store a value
    Put(PutArgs),
    /// Remove a key
    Delete {
        db: PathBuf,
        key: String,
    },
    /// List all keys
    Keys {
        db: PathBuf,
    },
    /// Print every key and value as tab-separated lines
    Dump {
        db: PathBuf,
    },
    /// Read tab-separated key/value lines into a store
    Load(LoadArgs),
    /// Reclaim space held by deleted and replaced entries
    Reorganize {
        db: PathBuf,
    },
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct PutArgs {
    db: PathBuf,
    key: String,
    value: String,

    /// Overwrite an existing value
    #[arg(long)]
    replace: bool,

    /// Flush to disk after the write
    #[arg(long)]
    sync: bool,
}

#[derive(Args, Debug)]
struct LoadArgs {
    db: PathBuf,

    /// Input file (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Overwrite existing keys instead of skipping them
    #[arg(long)]
    replace: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let mut config = LdbmConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    debug!(?config, "Loaded configuration");

    run(config, cli.command)
}

/// Setup logging to stderr and, optionally, a rolling file
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    let file_layer = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "ldbm.log");
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn open(config: LdbmConfig, db: &Path, mode: OpenMode) -> anyhow::Result<Ldbm> {
    let env = ldbm::initialize(config);
    env.open(db, mode, 0o644, 0)
        .with_context(|| format!("cannot open {} with {}", db.display(), env.kind()))
}

fn run(config: LdbmConfig, command: Commands) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Get { db, key } => {
            let store = open(config, &db, OpenMode::READER)?;
            let value = store.fetch(&key);
            if value.is_empty() {
                bail!("key '{}' not found", key);
            }
            out.write_all(&value)?;
            writeln!(out)?;
        }
        Commands::Put(args) => {
            let store = open(config, &args.db, OpenMode::WRCREAT)?;
            let mut flags = if args.replace {
                StoreFlags::REPLACE
            } else {
                StoreFlags::INSERT
            };
            if args.sync {
                flags = flags | StoreFlags::SYNC;
            }
            store
                .store(&args.key, &args.value, flags)
                .with_context(|| format!("cannot store '{}'", args.key))?;
        }
        Commands::Delete { db, key } => {
            let store = open(config, &db, OpenMode::WRITER)?;
            store
                .delete(&key)
                .with_context(|| format!("cannot delete '{}'", key))?;
        }
        Commands::Keys { db } => {
            let store = open(config, &db, OpenMode::READER)?;
            for key in store.keys() {
                writeln!(out, "{}", escape(&key))?;
            }
        }
        Commands::Dump { db } => {
            let store = open(config, &db, OpenMode::READER)?;
            for key in store.keys() {
                let value = store.fetch(&key);
                writeln!(out, "{}\t{}", escape(&key), escape(&value))?;
            }
        }
        Commands::Load(args) => {
            let store = open(config, &args.db, OpenMode::WRCREAT)?;
            let input: Box<dyn BufRead> = match &args.input {
                Some(path) => Box::new(BufReader::new(
                    std::fs::File::open(path)
                        .with_context(|| format!("cannot read {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(std::io::stdin())),
            };
            let flags = if args.replace {
                StoreFlags::REPLACE
            } else {
                StoreFlags::INSERT
            };

            let (mut loaded, mut skipped) = (0usize, 0usize);
            for (number, line) in input.lines().enumerate() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let (key, value) = line
                    .split_once('\t')
                    .with_context(|| format!("line {}: expected key<TAB>value", number + 1))?;
                let (key, value) = (unescape(key)?, unescape(value)?);
                match store.store(&key, &value, flags) {
                    Ok(()) => loaded += 1,
                    Err(_) if !args.replace => skipped += 1,
                    Err(failure) => return Err(failure).context(format!("line {}", number + 1)),
                }
            }
            store.sync()?;
            info!(loaded, skipped, "Load finished");
            eprintln!("loaded {} keys, skipped {}", loaded, skipped);
        }
        Commands::Reorganize { db } => {
            let store = open(config, &db, OpenMode::WRITER)?;
            store
                .reorganize()
                .with_context(|| format!("cannot reorganize {}", db.display()))?;
        }
        Commands::Version => {
            writeln!(out, "ldbm {}", ldbm::VERSION)?;
            writeln!(out, "backend: {}", config.backend)?;
        }
    }
    Ok(())
}

/// Printable form of a datum: tabs, newlines, backslashes and
/// non-printable bytes are escaped
fn escape(datum: &Datum) -> String {
    let mut out = String::with_capacity(datum.len());
    for &byte in datum.iter() {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out
}

fn unescape(text: &str) -> anyhow::Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\\') => out.push(b'\\'),
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'x') => {
                let hex = text
                    .get(i + 2..i + 4)
                    .context("truncated \\x escape")?;
                out.push(u8::from_str_radix(hex, 16).context("bad \\x escape")?);
                i += 2;
            }
            _ => bail!("bad escape in '{}'", text),
        }
        i += 2;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_round_trip() -> anyhow::Result<()> {
        let raw = Datum::from(&b"a\tb\\c\n\x00\xff"[..]);
        let text = escape(&raw);
        assert!(!text.contains('\t'));
        assert_eq!(unescape(&text)?, raw.into_vec());
        Ok(())
    }

    #[test]
    fn test_unescape_rejects_garbage() {
        assert!(unescape("bad\\q").is_err());
        assert!(unescape("short\\x4").is_err());
    }

    #[test]
    fn test_cli_parses_reorganize() {
        let cli = Cli::parse_from(["ldbm", "reorganize", "x.db"]);
        assert!(matches!(cli.command, Commands::Reorganize { db } if db == PathBuf::from("x.db")));
    }

    #[test]
    fn test_cli_parses_put() {
        let cli = Cli::parse_from(["ldbm", "--backend", "gdbm", "put", "x.db", "k", "v", "--replace"]);
        assert_eq!(cli.backend, Some(BackendKind::Gdbm));
        match cli.command {
            Commands::Put(args) => assert!(args.replace && !args.sync),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
