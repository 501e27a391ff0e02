use clap::Parser;
use status_store::{
    config::read_config_file,
    storage::{SqliteBackend, StorageBackend, StorageSupervisor},
};
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// SQLite database backing a configured table namespace
    #[arg(long, env = "STATUS_STORE_DATABASE")]
    database: Option<String>,

    /// Page of results to print, starting at 1
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Number of results per page
    #[arg(long, default_value_t = 20)]
    page_size: usize,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("status_store", LevelFilter::DEBUG),
        ("status_dump", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let supervisor = match &args.database {
        Some(database) => {
            let pool = SqliteBackend::connect(database).await?;
            StorageSupervisor::with_database(pool)
        }
        None => StorageSupervisor::new(),
    };
    supervisor.initialize(config.storage.as_ref()).await?;

    let statuses = supervisor
        .get()
        .await
        .get_all_service_statuses_with_result_pagination(args.page, args.page_size)
        .await?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);

    supervisor.shutdown().await?;
    Ok(())
}
