//! Hangman Server
//!
//! Loads the dictionary, creates the mailbox and its gates, and serves clients
//! until SIGINT/SIGTERM.

use clap::{Parser, ValueEnum};
use hangman_memory::channel::{unlink_stale, DEFAULT_NAMESPACE};
use hangman_memory::{ChannelConfig, Dictionary, RearmPolicy, Result, Server, ServerChannel};
use log::{error, info, warn};
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hangman server over a shared memory mailbox", long_about = None)]
struct Args {
    /// Dictionary file, one word per line (read from stdin if omitted)
    dictionary: Option<PathBuf>,

    /// Namespace of the shared memory object and semaphores
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Who re-arms the client gate after an exchange
    #[arg(long, value_enum, default_value = "client")]
    rearm: RearmArg,

    /// Remove objects left behind by a crashed server before starting
    #[arg(short, long)]
    force: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum RearmArg {
    Client,
    Server,
}

impl From<RearmArg> for RearmPolicy {
    fn from(arg: RearmArg) -> Self {
        match arg {
            RearmArg::Client => RearmPolicy::Client,
            RearmArg::Server => RearmPolicy::Server,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(args: Args) -> Result<()> {
    let dictionary = match &args.dictionary {
        Some(path) => {
            info!("Reading dictionary from {}", path.display());
            Dictionary::load(path)?
        }
        None => {
            info!("Reading dictionary from stdin");
            Dictionary::from_reader(io::stdin().lock())?
        }
    };
    info!("Loaded {} word(s)", dictionary.len());
    if dictionary.is_empty() {
        warn!("Dictionary is empty: every client will be told there are no games left");
    }

    if args.force {
        unlink_stale(&args.namespace)?;
    }

    let config = ChannelConfig {
        namespace: args.namespace,
        rearm: args.rearm.into(),
    };
    if config.rearm == RearmPolicy::Server {
        warn!("Server re-arm lets a second client overwrite a response before it is read");
    }

    let mut channel = ServerChannel::create(&config)?;

    let shutdown = channel.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested");
        if let Err(e) = shutdown.trigger() {
            error!("Failed to wake the server loop: {}", e);
        }
    }) {
        warn!("Could not install signal handler, stop the server with SIGKILL: {}", e);
    }

    let mut server = Server::new(dictionary);
    channel.run(&mut server)?;

    info!("Goodbye");
    Ok(())
}
