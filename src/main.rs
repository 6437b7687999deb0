//! Command-line front end: watches a directory and prints every message a
//! subscriber would receive.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tree_mirror::prelude::*;

#[derive(Parser, Debug)]
#[clap(name = "tree-mirror")]
#[clap(about = "Mirror a directory tree and print incremental updates", long_about = None)]
struct Args {
    /// Directory to watch (defaults to the current directory)
    #[clap(value_name = "DIR")]
    root: Option<PathBuf>,

    /// TOML file with watcher settings
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use polling instead of OS notifications
    #[clap(long)]
    poll: bool,
}

impl Args {
    fn watcher_config(&self) -> Result<WatcherConfig> {
        let mut config = match &self.config {
            Some(path) => WatcherConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => WatcherConfig::new(std::env::current_dir()?),
        };
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if self.poll {
            config.mode = WatchMode::Poll;
        }
        Ok(config)
    }
}

fn describe(text: &str) -> String {
    match Message::decode(text) {
        Ok(Message::Root(listing)) => format!("root: {} entries", listing.len()),
        Ok(Message::Update(ops)) => {
            let inserted: usize = ops
                .iter()
                .map(|op| match op {
                    UpdateOp::Insert(entries) => entries.len(),
                    _ => 0,
                })
                .sum();
            let deleted: usize = ops
                .iter()
                .map(|op| match op {
                    UpdateOp::Delete(n) => *n,
                    _ => 0,
                })
                .sum();
            format!("update: {} ops, +{} -{}", ops.len(), inserted, deleted)
        }
        Ok(Message::Space(space)) => format!(
            "space: {} used / {} total, {} free, {} tracked",
            space.used, space.total, space.free, space.storage
        ),
        Err(e) => format!("undecodable message: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tree_mirror=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.watcher_config()?;

    let pubsub = Arc::new(PubSub::new());
    let mut subscription = pubsub.subscribe();

    let watcher = TreeWatcher::start(config, pubsub.clone(), tokio::runtime::Handle::current())?;
    println!("Watching: {}", watcher.root().display());
    println!("Press Ctrl+C to exit\n");

    let printer = tokio::spawn(async move {
        while let Some(text) = subscription.receiver.recv().await {
            println!("[{}] {}", subscription.id, describe(&text));
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    println!("\nShutting down...");

    let mut watcher = watcher;
    tokio::task::spawn_blocking(move || watcher.stop()).await??;
    printer.abort();

    println!("Done!");
    Ok(())
}
