// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use logpipe::consumer::{ConsumerGroup, IndexingHandler, KafkaDeadLetterQueue};
use logpipe::entry::Priority;
use logpipe::init::args::{ConsumeArgs, LogFormatArg, ServeArgs};
use logpipe::init::wait::{self, TaskResult};
use logpipe::logger::{Logger, LoggerContext};
use logpipe::producer::{FallbackWriter, KafkaSink, StreamSink};
use logpipe::query::{CidrGeoLookup, GeoLookup, QueryEngine};
use logpipe::search::{ElasticClient, SearchBackend};
use logpipe::server::QueryServer;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Consume log entries from Kafka and index them
    Consume(Box<ConsumeArgs>),

    /// Serve the HTTP query API
    Serve(Box<ServeArgs>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "logpipe")]
#[command(bin_name = "logpipe")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "LOGPIPE_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let command = match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version());
            return ExitCode::SUCCESS;
        }
        Some(command) => command,
        None => {
            eprintln!("ERROR: must specify a command");
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = match command {
        Commands::Consume(args) => run_consume(args),
        Commands::Serve(args) => run_serve(args),
        Commands::Version => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = e, "Failed to run logpipe.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_consume(args: Box<ConsumeArgs>) -> TaskResult {
    let search_config = args.search.build_config();
    let backend = Arc::new(ElasticClient::new(&search_config)?);
    backend
        .ping()
        .await
        .map_err(|e| format!("search engine at {} is unreachable: {}", search_config.address, e))?;
    info!(address = search_config.address, "Search engine is reachable");

    let config = args.build_config();
    let dlq = Arc::new(KafkaDeadLetterQueue::new(&config)?);
    let handler = Arc::new(IndexingHandler::new(backend, dlq, search_config.index));
    let group = ConsumerGroup::new(config, handler);

    let cancel_token = CancellationToken::new();
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    {
        let token = cancel_token.clone();
        tasks.spawn(async move {
            group
                .run(token)
                .await
                .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
        });
    }

    run_until_shutdown(&mut tasks, &cancel_token).await
}

#[tokio::main]
async fn run_serve(args: Box<ServeArgs>) -> TaskResult {
    let search_config = args.search.build_config();
    let backend = Arc::new(ElasticClient::new(&search_config)?);
    if let Err(e) = backend.ping().await {
        warn!(address = search_config.address, error = %e, "Search engine is unreachable, queries will fail until it is up");
    }

    let engine = Arc::new(
        QueryEngine::new(backend, search_config.index.clone())
            .with_page_size(args.page_size)
            .with_timeout(search_config.timeout),
    );

    let geo: Arc<dyn GeoLookup> = match &args.geo_db {
        Some(path) => {
            let lookup = CidrGeoLookup::load(path)
                .map_err(|e| format!("failed to load geo database {}: {}", path, e))?;
            info!(path, networks = lookup.len(), "Loaded geo database");
            Arc::new(lookup)
        }
        None => Arc::new(CidrGeoLookup::default()),
    };

    let mut server = QueryServer::new(engine, geo).with_header_timeout(args.header_timeout);

    let mut writer = None;
    if let Some(producer_config) = args.audit.build_config(args.security.build_security()) {
        let sink = tokio::task::spawn_blocking(move || KafkaSink::connect(&producer_config))
            .await??;
        let fallback = Arc::new(FallbackWriter::new(sink, StreamSink::stderr()));
        let logger = Logger::new(
            Arc::new(LoggerContext::new(Priority::Info)),
            args.audit.audit_app.clone(),
            fallback.clone(),
        )
        .with_who("logpipe")
        .with_module("server")
        .with_class("query")
        .with_instance(args.listen_addr.port().to_string());
        server = server.with_audit_logger(logger);
        writer = Some(fallback);
    }

    let listener = TcpListener::bind(args.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", args.listen_addr, e))?;

    let cancel_token = CancellationToken::new();
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    {
        let token = cancel_token.clone();
        tasks.spawn(async move { server.serve(listener, token).await });
    }

    let result = run_until_shutdown(&mut tasks, &cancel_token).await;

    if let Some(writer) = writer {
        if let Err(e) = tokio::task::spawn_blocking(move || writer.close()).await? {
            warn!(error = %e, "Failed to close audit log writer");
        }
    }
    result
}

async fn run_until_shutdown(
    tasks: &mut JoinSet<TaskResult>,
    cancel_token: &CancellationToken,
) -> TaskResult {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        _ = sig_int.recv() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        e = wait::wait_for_any_task(tasks) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of task."),
                Err(e) => return Err(e),
            }
        },
    }

    wait::wait_for_tasks_with_timeout(tasks, SHUTDOWN_TIMEOUT).await
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("rdkafka=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
