use hellocache::HelloFs;

use fuse_cache::{CacheConfig, CacheFs, ConnectivityState, FileSystem, Operation, Reply, Request};

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use structopt::StructOpt;
use tracing::debug;

#[derive(Debug, StructOpt)]
#[structopt(about = "Reads a file of the hello backend through the read cache")]
struct Args {
    #[structopt(
        long,
        default_value = "online",
        help = "Connectivity reported by the backend: online, offline or synchronizing"
    )]
    status: ConnectivityState,

    #[structopt(long, default_value = "2", help = "The inode to read")]
    ino: u64,

    #[structopt(long, default_value = "0")]
    offset: u64,

    #[structopt(long, default_value = "64")]
    size: u32,

    #[structopt(long, default_value = "2", help = "How many times to read")]
    repeat: u32,

    #[structopt(long, help = "Do not refresh in the background while synchronizing")]
    no_refresh: bool,

    #[structopt(long, default_value = "1", help = "Attribute validity in seconds")]
    attr_timeout: u64,
}

fn setup_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{
        fmt::{self, time::ChronoLocal},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    tracing_subscriber::fmt()
        .event_format(fmt::format::Format::default().pretty())
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .finish()
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::from_args();
    async_std::task::block_on(run(args))?;
    Ok(())
}

#[allow(clippy::unit_arg)]
#[tracing::instrument(err)]
async fn run(args: Args) -> Result<()> {
    let mut config = CacheConfig::default();
    config
        .attr_timeout(Duration::from_secs(args.attr_timeout))
        .background_refresh(!args.no_refresh);

    let fs = CacheFs::new(Arc::new(HelloFs::new(args.status)), config);
    let req = Request::default();

    fs.dispatch(&req, Operation::Init).await?;

    let reply = fs.dispatch(&req, Operation::GetAttr { ino: args.ino }).await;
    debug!(?reply);

    let mut stdout = io::stdout();
    for round in 0..args.repeat {
        let op = Operation::Read {
            ino: args.ino,
            fh: 0,
            offset: args.offset,
            size: args.size,
        };
        let data = match fs.dispatch(&req, op).await? {
            Reply::Data(data) => data,
            reply => bail!("unexpected reply to read: {:?}", reply),
        };
        debug!(round, len = data.len(), "read");
        stdout.write_all(&data)?;
        if data.is_empty() {
            writeln!(stdout, "<empty>")?;
        }
    }
    stdout.flush()?;

    if args.status == ConnectivityState::Synchronizing {
        // let a background refresh finish before reporting
        async_std::task::sleep(Duration::from_millis(50)).await;
        while fs.store().is_refreshing(args.ino) {
            async_std::task::sleep(Duration::from_millis(10)).await;
        }
    }

    fs.dispatch(&req, Operation::Destroy).await?;

    let stats = fs.store().stats();
    println!(
        "hits={} misses={} fills={} coalesced={} invalidations={} refreshes={}",
        stats.hits,
        stats.misses,
        stats.fills,
        stats.coalesced,
        stats.invalidations,
        stats.refreshes,
    );

    Ok(())
}
