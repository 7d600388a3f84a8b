/*!
 * Configuration handling for PackFS
 */

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::error::Result;
use crate::{bail, ensure};

/// Command-line arguments for PackFS
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "packfs",
    version = env!("CARGO_PKG_VERSION"),
    about = "Tar-compatible directory archiver with order-0 Huffman compression",
    long_about = "Archives a directory tree into a tar-compatible stream and back, \
                  and compresses/decompresses byte streams with a canonical Huffman code."
)]
pub struct Args {
    /// Operation to perform
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,
}

/// PackFS operations
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Archive a directory tree
    Create {
        /// Directory to archive
        directory: String,
        /// Output archive file
        archive: String,
        /// Huffman-compress the archive stream
        #[clap(long)]
        compress: bool,
    },
    /// Rebuild a directory tree from an archive
    Extract {
        /// Archive file to read
        archive: String,
        /// Destination directory
        #[clap(default_value = ".")]
        destination: String,
        /// The archive was written with --compress
        #[clap(long)]
        compressed: bool,
    },
    /// Huffman-compress an arbitrary file
    Compress {
        /// Input file
        input: String,
        /// Output file
        output: String,
    },
    /// Decompress a file written by the compress command
    Decompress {
        /// Input file
        input: String,
        /// Output file
        output: String,
    },
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Operation to perform
    pub command: Command,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Result<Self> {
        match args.command {
            Some(command) => Ok(Self { command }),
            None => bail!(Config, "no operation given, see --help"),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Create { directory, .. } => {
                let dir = PathBuf::from(directory);
                ensure!(
                    dir.is_dir(),
                    Config,
                    "target directory not found: {}",
                    dir.display()
                );
            }
            Command::Extract { archive, destination, .. } => {
                ensure!(
                    PathBuf::from(archive).is_file(),
                    Config,
                    "archive not found: {}",
                    archive
                );
                let dest = PathBuf::from(destination);
                ensure!(
                    dest.is_dir(),
                    Config,
                    "destination directory not found: {}",
                    dest.display()
                );
            }
            Command::Compress { input, .. } | Command::Decompress { input, .. } => {
                ensure!(
                    PathBuf::from(input).is_file(),
                    Config,
                    "input file not found: {}",
                    input
                );
            }
        }
        Ok(())
    }
}
