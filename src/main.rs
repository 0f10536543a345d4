use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use tchatator413::cli::{exit_code, Cli};
use tchatator413::dal::pg::PgDal;
use tchatator413::dal::Dal;
use tchatator413::config;
use tchatator413::server::{evaluate_request, install_shutdown_signal, Server};
use tokio_util::sync::CancellationToken;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(exit_code::USAGE);
        }
    };

    let settings = match config::load_settings(cli.config.as_deref(), cli.verbosity()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(exit_code::DATA_ERROR);
        }
    };

    if cli.dump_config {
        config::dump(&settings);
        std::process::exit(exit_code::OK);
    }

    init_logging(&settings);
    config::init(settings);
    let cfg = config::settings();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(exit_code::DATA_ERROR);
        }
    };

    let exit = runtime.block_on(async move {
        let dal = match PgDal::connect(&cfg.database.url()).await {
            Ok(dal) => Arc::new(dal) as Arc<dyn Dal>,
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to the database");
                return exit_code::NO_DATABASE;
            }
        };

        if cli.interactive {
            run_interactive(&cli, dal.as_ref(), cfg).await
        } else {
            run_server(dal, cfg).await
        }
    });

    std::process::exit(exit);
}

async fn run_server(dal: Arc<dyn Dal>, cfg: &'static config::Settings) -> i32 {
    let server = match Server::bind(Arc::new(cfg.clone()), dal).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listener");
            return exit_code::DATA_ERROR;
        }
    };

    let shutdown = CancellationToken::new();
    install_shutdown_signal(shutdown.clone());

    match server.serve(shutdown).await {
        Ok(()) => exit_code::OK,
        Err(e) => {
            tracing::error!(error = %e, "server exited with an error");
            exit_code::DATA_ERROR
        }
    }
}

async fn run_interactive(cli: &Cli, dal: &dyn Dal, cfg: &config::Settings) -> i32 {
    let raw = match &cli.request {
        Some(body) => body.clone(),
        None => {
            let mut buf = String::new();
            if std::io::stdin().read_to_string(&mut buf).is_err() {
                return exit_code::DATA_ERROR;
            }
            buf
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(_) => serde_json::Value::Null,
    };

    let responses = evaluate_request(&value, dal, cfg).await;
    println!("{}", serde_json::Value::Array(responses));
    exit_code::OK
}

fn init_logging(settings: &config::Settings) {
    use tracing_subscriber::EnvFilter;

    let level = if settings.log_debug() {
        "debug"
    } else if settings.log_info() {
        "info"
    } else if settings.log_warning() {
        "warn"
    } else {
        "error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &settings.log_file {
        config::LogSink::Stderr => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
        config::LogSink::File(path) => {
            if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::sync::Mutex::new(file))
                    .init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
            }
        }
    }
}
