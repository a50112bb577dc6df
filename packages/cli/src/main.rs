use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

mod error;
mod logging;
mod measure;
mod view;

use measure::MeasureConfig;

/// kvbridge - inspect and benchmark kvbridge stores
#[derive(Parser, Debug)]
#[command(name = "kvbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every key and value of a store as a table
    View {
        /// Store file to open read-only
        path: PathBuf,
    },

    /// Compare direct store access with access through the worker thread
    Measure {
        /// Number of items to write and read back
        #[arg(long, default_value_t = MeasureConfig::default().items)]
        items: usize,

        /// Size of each value in bytes
        #[arg(long, default_value_t = MeasureConfig::default().size)]
        size: usize,

        /// Also write the results to this JSON file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    let result = match args.command {
        Command::View { path } => view::run(&path).await,
        Command::Measure { items, size, json } => {
            measure::run(MeasureConfig { items, size }, json).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
