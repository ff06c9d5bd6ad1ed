//! Inspect and edit files at arbitrary byte offsets.
use std::path::PathBuf;

use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tracing::{debug, error};

use random_access_file::RandomAccessFile;
use random_access_file::file::{
    CloseError, DeleteError, ReadError, StatError, TruncateError, UnlinkError, WriteError,
};

mod app_config;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Random-access reads and writes on a single file.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a raf config TOML."
    )]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print `size` bytes at `offset` to stdout.
    Read {
        file: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        #[arg(short, long)]
        size: usize,
    },

    /// Write DATA, or stdin when DATA is omitted, at `offset`.
    Write {
        file: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        data: Option<String>,
    },

    /// Delete a byte range. Interior ranges are zeroed, ranges reaching the end shrink the file.
    Del {
        file: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        #[arg(short, long, conflicts_with = "to_end", required_unless_present = "to_end")]
        size: Option<u64>,
        #[arg(long, help = "Delete everything from offset on.")]
        to_end: bool,
    },

    /// Set the file length.
    Truncate { file: PathBuf, len: u64 },

    /// Print file metadata.
    Stat { file: PathBuf },

    /// Remove the file.
    Unlink { file: PathBuf },
}

#[derive(Debug, Error)]
enum CommandError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Delete(#[from] DeleteError),

    #[error(transparent)]
    Truncate(#[from] TruncateError),

    #[error(transparent)]
    Stat(#[from] StatError),

    #[error(transparent)]
    Close(#[from] CloseError),

    #[error(transparent)]
    Unlink(#[from] UnlinkError),

    #[error("stdio error: {0}")]
    Stdio(#[from] std::io::Error),
}

impl From<CommandError> for i32 {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Read(e) => Self::from(e),
            CommandError::Write(e) => Self::from(e),
            CommandError::Delete(e) => Self::from(e),
            CommandError::Truncate(e) => Self::from(e),
            CommandError::Stat(e) => Self::from(e),
            CommandError::Close(e) => Self::from(e),
            CommandError::Unlink(e) => Self::from(e),
            CommandError::Stdio(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<(), CommandError> {
    let options = config.file_options();
    match command {
        Command::Read { file, offset, size } => {
            let handle = RandomAccessFile::new(file, options.with_writable(false));
            let data = handle.read(offset, size).await?;
            handle.close().await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Command::Write { file, offset, data } => {
            let data = match data {
                Some(data) => data.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            let handle = RandomAccessFile::new(file, options);
            handle.write(offset, data).await?;
            handle.close().await?;
        }
        Command::Del {
            file,
            offset,
            size,
            to_end,
        } => {
            let size = if to_end {
                random_access_file::DELETE_TO_END
            } else {
                size.unwrap_or(0)
            };
            let handle = RandomAccessFile::new(file, options);
            handle.del(offset, size).await?;
            handle.close().await?;
        }
        Command::Truncate { file, len } => {
            let handle = RandomAccessFile::new(file, options);
            handle.truncate(len).await?;
            handle.close().await?;
        }
        Command::Stat { file } => {
            let handle = RandomAccessFile::new(file, options.with_writable(false));
            let stat = handle.stat().await?;
            handle.close().await?;
            println!("path:       {}", handle.filename().display());
            println!("size:       {} ({} bytes)", ByteSize::b(stat.size), stat.size);
            println!(
                "allocated:  {}",
                ByteSize::b(stat.blocks.saturating_mul(512))
            );
            println!("block size: {}", stat.block_size);
        }
        Command::Unlink { file } => {
            RandomAccessFile::new(file, options).unlink().await?;
        }
    }
    Ok(())
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    if let Err(e) = Trc::default().init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    debug!(config = ?config, "Loaded configuration.");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start the runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args.command, &config)) {
        error!("{e}");
        std::process::exit(i32::from(e));
    }
}
