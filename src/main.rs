use log::{error, info};
use std::process::ExitCode;

use pinlog::{
    AppConfig, AppError, DualSink, EdgeWatcher, GpioBackend, PinRegistry, TriggerLogger, channel,
    init_logging, open_backend,
};

fn arg_or_env(position: usize, var: &str, default: &str) -> String {
    std::env::args()
        .nth(position)
        .or_else(|| std::env::var(var).ok())
        .unwrap_or_else(|| default.to_string())
}

async fn monitor<B: GpioBackend>(
    config: &AppConfig,
    backend: &B,
    sink: DualSink,
) -> Result<(), AppError> {
    let registry = PinRegistry::resolve_all(backend, &config.pins)?;

    let (notify, notifications) = channel();
    let watchers = EdgeWatcher::spawn_all(&registry, &notify)?;
    drop(notify);
    info!("Started {} edge watchers", watchers.len());

    let logger = TriggerLogger::new(registry, sink);
    Err(logger.run(notifications).await)
}

async fn run(sink: DualSink) -> Result<(), AppError> {
    let config_path = arg_or_env(1, "PINLOG_CONFIG", "config.json");
    let config = AppConfig::load_from_file(&config_path)?;
    info!("Config: {:?}", config);

    let backend = open_backend(&config)?;
    monitor(&config, &backend, sink).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let log_path = arg_or_env(2, "PINLOG_LOG_FILE", "pinlog.log");
    let sink = match DualSink::open(&log_path) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Fatal: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&sink) {
        eprintln!("Fatal: {e}");
        return ExitCode::FAILURE;
    }
    info!("Logging to stdout and {}", sink.path().display());

    match run(sink).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
