use clap::Parser;
use log::{error, info, warn};
use matter_device_bridge::bridge::{BridgeManager, DeviceTypeRegistry, JsonFileStore};
use matter_device_bridge::config::{Config, load_dotenv};
use matter_device_bridge::console::Console;
use matter_device_bridge::error::StatusCode;
use matter_device_bridge::matter::{EndpointId, NodeConfig, SimulatedNode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;

#[derive(Parser)]
#[command(name = "matter-device-bridge")]
#[command(about = "Bridge non-Matter devices onto a Matter node")]
struct Cli {
    /// JSON file holding persisted bridge state
    #[arg(long, env = "BRIDGE_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Capacity of the bridged-device table
    #[arg(long, env = "BRIDGE_MAX_DEVICES")]
    max_devices: Option<usize>,

    /// Aggregator endpoint bridged devices are resumed under
    #[arg(long, env = "BRIDGE_AGGREGATOR_ENDPOINT")]
    aggregator_endpoint: Option<EndpointId>,

    /// Run a single console command and exit with its status
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn exit_code(status: StatusCode) -> ExitCode {
    ExitCode::from(status.code())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.state_file {
        config.bridge.state_file = path;
    }
    if let Some(max) = cli.max_devices {
        config.bridge.max_bridged_device_count = max;
    }
    if let Some(endpoint) = cli.aggregator_endpoint {
        config.bridge.aggregator_endpoint_id = endpoint;
    }

    info!("Starting Matter device bridge");
    info!("  State file: {:?}", config.bridge.state_file);
    info!("  Max bridged devices: {}", config.bridge.max_bridged_device_count);
    info!("  Aggregator endpoint: {}", config.bridge.aggregator_endpoint_id);

    let store = match JsonFileStore::open(&config.bridge.state_file) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open bridge state {:?}: {}", config.bridge.state_file, e);
            return exit_code(StatusCode::InvalidState);
        }
    };
    let node = match SimulatedNode::with_store(NodeConfig::from(&config.bridge), store.clone()) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("Failed to start Matter node: {}", e);
            return exit_code(StatusCode::InvalidState);
        }
    };
    let manager = match BridgeManager::new(
        config.bridge.max_bridged_device_count,
        node,
        store,
        DeviceTypeRegistry::builtin(),
    ) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to create bridge manager: {}", e);
            return exit_code(e.status());
        }
    };

    match manager.resume_all(config.bridge.aggregator_endpoint_id) {
        Ok(report) => {
            for (endpoint_id, e) in &report.failed {
                warn!("  endpoint {} not resumed: {}", endpoint_id, e);
            }
        }
        Err(e) => error!("Failed to read persisted bridged devices: {}", e),
    }

    let console = Console::new(manager);

    if !cli.command.is_empty() {
        let line = cli.command.join(" ");
        return match console.handle_line(&line) {
            Some(output) => {
                println!("{}", output.text);
                exit_code(output.status)
            }
            None => ExitCode::SUCCESS,
        };
    }

    info!("Bridge console ready, type 'help' for commands");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = console.run(stdin, stdout) => {
            if let Err(e) = result {
                error!("Console I/O error: {}", e);
                return exit_code(StatusCode::InvalidState);
            }
        }
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    info!("Matter device bridge stopped");
    ExitCode::SUCCESS
}
