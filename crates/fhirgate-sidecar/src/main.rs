//! fhirgate Sidecar - Entry point

use std::path::PathBuf;

use tracing::{error, info};

use fhirgate_config::{ConfigLoader, GateConfig, LogFormat};
use fhirgate_middleware::{AuthenticatorClient, NotifierClient, Pipeline};
use fhirgate_sidecar::{GateServer, SidecarError, SidecarResult};
use fhirgate_telemetry::{init_logging, metrics, LogConfig, LogOutput};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("fhirgate-sidecar {}", fhirgate_sidecar::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"fhirgate Sidecar - FHIR Patient API gate

USAGE:
    fhirgate-sidecar [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    FHIRGATE__<SECTION>__<KEY>       Override any configuration key
    HCH_BASE_URL                     Remote base URL
    HCH_AUTHENTICATE_USER_URL        Authenticator path below the base URL
    HCH_NOTIFICATIONS_URL            Notifications path below the base URL
    HCH_CLIENT_GRANT_ACCESS_TOKEN    Service credential for notifications
    VALIDATE_PATIENT                 Enable payload-aware validation
    RUST_LOG                         Log filter, overrides logging.level

EXAMPLES:
    fhirgate-sidecar --config /etc/fhirgate/gate.toml
"
    );
}

fn load_config(path: Option<PathBuf>) -> SidecarResult<GateConfig> {
    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = path {
        loader = loader.with_file(path)?;
    }
    let config = loader.with_dotenv()?.with_env_prefix("FHIRGATE").load()?;
    Ok(config)
}

fn log_config(config: &GateConfig) -> LogConfig {
    let output = match config.logging.format {
        LogFormat::Json => LogOutput::Json,
        LogFormat::Pretty => LogOutput::Pretty,
    };
    LogConfig::new(config.logging.level.clone(), output)
}

async fn run(config: GateConfig) -> SidecarResult<()> {
    metrics::install_recorder()?;

    let authenticator = AuthenticatorClient::new(&config.remote)?;
    let notifier = NotifierClient::new(&config.remote)?;
    let endpoint = authenticator.endpoint().to_string();
    let pipeline = Pipeline::gate(&config, authenticator, notifier);
    info!(
        authenticator = %endpoint,
        stages = ?pipeline.stage_names(),
        api_root = %config.gate.api_root,
        validate_patient = config.gate.validate_patient,
        dispatch = ?config.notifier.dispatch,
        "Starting fhirgate sidecar v{}",
        fhirgate_sidecar::VERSION
    );

    GateServer::new(config, pipeline)?.run().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            if let SidecarError::Config(config_error) = &e {
                if let Some(subject) = config_error.subject() {
                    eprintln!("Check `{subject}` in the config file or its FHIRGATE__ override");
                }
            }
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = init_logging(&log_config(&config)) {
        let e = SidecarError::from(e);
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "fhirgate sidecar stopped");
        std::process::exit(e.exit_code());
    }
}
