use std::{error::Error, io::Write, path::PathBuf, process, sync::Arc, time::Duration};

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use dcrgui::{
    backend::{
        mock::{mock_proposal, MockBackend, MOCK_EXCHANGE_HOST},
        model::{
            NewWalletForm, Notification, SyncProgress, SyncStage, Transaction, VoteChoice,
        },
    },
    config::{default_datadir, Config, DEFAULT_FILE_NAME},
    logger::{parse_log_level, setup_logger},
    page::{DexPage, OverviewPage, Page, PageContext, ProposalPage, Toast},
    redraw::RedrawSignal,
    VERSION,
};

const FRAME: Duration = Duration::from_millis(16);
const APP_PASSWORD: &str = "sim";

#[derive(Debug, PartialEq)]
enum Arg {
    DatadirPath(PathBuf),
    ConfigPath(PathBuf),
}

fn parse_args(args: Vec<String>) -> Result<Vec<Arg>, Box<dyn Error>> {
    let mut res = Vec::new();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-v") {
        eprintln!("{}", VERSION);
        process::exit(1);
    }

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        eprintln!(
            r#"
Usage: dcrgui-sim [OPTIONS]

Drive the overview, proposal and DEX pages against an in-memory backend.

Options:
    --datadir <PATH>    Path of the data directory
    --config <PATH>     Path of the configuration file
    -v, --version       Display dcrgui-sim version
    -h, --help          Print help
        "#
        );
        process::exit(1);
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--datadir" => match args.get(i + 1) {
                Some(a) => res.push(Arg::DatadirPath(PathBuf::from(a))),
                None => return Err("missing arg to --datadir".into()),
            },
            "--config" => match args.get(i + 1) {
                Some(a) => res.push(Arg::ConfigPath(PathBuf::from(a))),
                None => return Err("missing arg to --config".into()),
            },
            a => return Err(format!("unknown argument '{}'", a).into()),
        }
        i += 2;
    }

    Ok(res)
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut datadir = None;
    let mut config_path = None;
    for arg in parse_args(std::env::args().collect())? {
        match arg {
            Arg::DatadirPath(path) => datadir = Some(path),
            Arg::ConfigPath(path) => config_path = Some(path),
        }
    }
    let datadir = match datadir {
        Some(datadir) => datadir,
        None => default_datadir()?,
    };
    let config_path = config_path.unwrap_or_else(|| datadir.join(DEFAULT_FILE_NAME));
    let config = Config::from_file_or_default(&config_path)?;

    let log_level = match parse_log_level()? {
        Some(level) => level,
        None => config.log_level()?,
    };
    setup_logger(log_level, &datadir)?;
    setup_panic_hook();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();
    runtime.block_on(simulate(handle, config))
}

async fn simulate(runtime: Handle, config: Config) -> Result<(), Box<dyn Error>> {
    let backend = Arc::new(MockBackend::new());
    backend.set_call_delay(Duration::from_millis(40));
    // The first wallet selected answers last.
    backend.set_fetch_delay(2, Duration::from_millis(80));
    backend.set_fetch_delay(1, Duration::from_millis(20));
    let ctx = PageContext::new(backend.clone(), runtime, config);

    let mut overview = OverviewPage::new(ctx.clone());
    overview.on_navigated_to();
    let feed = tokio::spawn(feed_notifications(backend.clone()));
    frames(&mut overview, &ctx.redraw, 20).await;
    feed.await?;
    frames(&mut overview, &ctx.redraw, 2).await;
    let state = overview.state();
    info!(
        "Synced: {}, best block: {}, peers: {}, recent transactions: {}",
        state.synced,
        state.best_block,
        state.connected_peers,
        state.recent_transactions.len()
    );
    overview.on_navigated_from();

    let mut proposal = ProposalPage::new(ctx.clone(), mock_proposal());
    proposal.on_navigated_to();
    proposal.select_wallet(2);
    proposal.select_wallet(1);
    frames(&mut proposal, &ctx.redraw, 10).await;
    proposal.open_vote_modal()?;
    proposal.increment(VoteChoice::Yes)?;
    proposal.increment(VoteChoice::Yes)?;
    proposal.set_max(VoteChoice::No)?;
    if let Some((yes, no, remaining)) = proposal.allocation() {
        info!("Voting {} yes, {} no, {} left", yes, no, remaining);
    }
    proposal.submit("wallet-1")?;
    frames(&mut proposal, &ctx.redraw, 10).await;
    proposal.on_navigated_from();

    let mut dex = DexPage::new(ctx.clone());
    dex.on_navigated_to();
    frames(&mut dex, &ctx.redraw, 5).await;
    dex.initialize(APP_PASSWORD)?;
    frames(&mut dex, &ctx.redraw, 5).await;
    dex.select_exchange(MOCK_EXCHANGE_HOST, None)?;
    frames(&mut dex, &ctx.redraw, 5).await;
    dex.create_wallet(NewWalletForm {
        asset: "dcr".to_string(),
        account: "default".to_string(),
        wallet_password: "wallet-1".to_string(),
        app_password: APP_PASSWORD.to_string(),
    })?;
    frames(&mut dex, &ctx.redraw, 5).await;
    dex.register(APP_PASSWORD, None)?;
    frames(&mut dex, &ctx.redraw, 5).await;
    info!("DEX: {:?}", dex.state());
    dex.on_navigated_from();

    ctx.shutdown.cancel();
    Ok(())
}

/// Run the frame loop of a page for `count` frames.
async fn frames(page: &mut dyn Page, redraw: &RedrawSignal, count: usize) {
    for _ in 0..count {
        for toast in page.handle_frame() {
            match toast {
                Toast::Success(msg) => info!("[{}] {}", page.id(), msg),
                Toast::Error(e) => warn!("[{}] {}", page.id(), e),
            }
        }
        if redraw.take() {
            debug!("[{}] redraw", page.id());
        }
        tokio::time::sleep(FRAME).await;
    }
}

async fn feed_notifications(backend: Arc<MockBackend>) {
    backend.emit(Notification::SyncStarted { restarted: false });
    backend.emit(Notification::PeersChanged { connected: 3 });
    for step in 1..=3u32 {
        let height = step * 200_000;
        backend.emit(Notification::SyncProgress(SyncProgress {
            stage: SyncStage::Headers,
            total_progress: (step * 33) as u8,
            headers_fetched: height,
            best_block_height: height,
            time_remaining_secs: u64::from(3 - step) * 60,
        }));
        tokio::time::sleep(FRAME * 2).await;
    }
    backend.emit(Notification::SyncCompleted);
    backend.emit(Notification::NewTransaction(Transaction {
        wallet_id: 1,
        hash: "4a1e0c6f".to_string(),
        amount: 250_000_000,
        block_height: None,
    }));
}

// A panic in any thread should stop the main thread, and print the panic.
fn setup_panic_hook() {
    std::panic::set_hook(Box::new(move |panic_info| {
        let file = panic_info
            .location()
            .map(|l| l.file())
            .unwrap_or_else(|| "'unknown'");
        let line = panic_info
            .location()
            .map(|l| l.line().to_string())
            .unwrap_or_else(|| "'unknown'".to_string());

        let bt = backtrace::Backtrace::new();
        let info = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned());
        error!(
            "panic occurred at line {} of file {}: {:?}\n{:?}",
            line, file, info, bt
        );

        std::io::stdout().flush().expect("Flushing stdout");
        std::process::exit(1);
    }));
}
