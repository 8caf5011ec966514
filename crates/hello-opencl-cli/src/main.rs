//! hello-opencl: square 1024 floats on a compute device and check them.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hello_opencl::{
    ComputeBackend, DevicePreference, OpenClError, Pipeline, PipelineConfig, ReferenceBackend,
    ResourceLocator,
};
use hello_opencl_cli::exit::{exit_code_for, EXIT_INFRA_FAIL};
use hello_opencl_cli::report::ConsoleReporter;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    /// OpenCL when compiled in, otherwise the host reference backend
    Auto,
    Opencl,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "hello-opencl")]
#[command(about = "Square an array of floats with an OpenCL kernel and verify the result")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kernel source file (skips the resource lookup)
    #[arg(long, value_name = "PATH")]
    kernel: Option<PathBuf>,

    /// Number of values to square
    #[arg(short = 'n', long, value_name = "N")]
    num_values: Option<usize>,

    /// Kernel entry point
    #[arg(long, value_name = "NAME")]
    entry_point: Option<String>,

    /// Device preference
    #[arg(long, value_enum)]
    device: Option<DeviceArg>,

    /// Compute backend
    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Options passed to the program build
    #[arg(long, value_name = "STR", allow_hyphen_values = true)]
    build_options: Option<String>,

    /// Exit with status 2 when the output does not validate
    #[arg(long)]
    strict: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceArg {
    Auto,
    Gpu,
    Cpu,
}

impl From<DeviceArg> for DevicePreference {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Gpu => DevicePreference::Gpu,
            DeviceArg::Cpu => DevicePreference::Cpu,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(EXIT_INFRA_FAIL);
    }

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            // Config errors arrive wrapped in context; pipeline errors bare.
            match e.downcast_ref::<OpenClError>() {
                Some(OpenClError::InvalidConfig(_)) | Some(OpenClError::ConfigFile { .. }) | None => {
                    println!("Error: {e:#}");
                }
                Some(err) => {
                    ConsoleReporter::new(io::stdout().lock(), color_enabled()).report_error(err)
                }
            }
            EXIT_INFRA_FAIL
        }
    };
    std::process::exit(code);
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("invalid log level '{}'", cli.log_level))?;

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(io::stderr);

    let installed = match cli.log_format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("{e}")).context("failed to install log subscriber")
}

fn color_enabled() -> bool {
    io::stdout().is_terminal()
}

/// Defaults, then the config file, then `HELLO_OPENCL_*`, then flags.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let base = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut config = base.with_env_overrides().context("Invalid HELLO_OPENCL_* environment")?;

    if let Some(path) = &cli.kernel {
        config.kernel_path = Some(path.clone());
    }
    if let Some(n) = cli.num_values {
        config.num_values = n;
    }
    if let Some(name) = &cli.entry_point {
        config.entry_point = name.clone();
    }
    if let Some(device) = cli.device {
        config.device = device.into();
    }
    if let Some(options) = &cli.build_options {
        config.build_options = options.clone();
    }
    config.strict_validation |= cli.strict;

    config.validate().context("Invalid configuration")?;
    debug!(?config, "effective configuration");
    Ok(config)
}

fn run(cli: &Cli) -> Result<i32> {
    let config = load_config(cli)?;
    let locator = ResourceLocator::from_executable();

    match cli.backend {
        BackendChoice::Reference => execute(&ReferenceBackend::new(), &config, &locator),
        #[cfg(feature = "opencl")]
        BackendChoice::Opencl | BackendChoice::Auto => {
            execute(&hello_opencl::OpenClBackend::new(), &config, &locator)
        }
        #[cfg(not(feature = "opencl"))]
        BackendChoice::Opencl => Err(OpenClError::BackendUnavailable(
            "this build has no OpenCL support; rebuild with --features opencl".into(),
        )
        .into()),
        #[cfg(not(feature = "opencl"))]
        BackendChoice::Auto => {
            info!("OpenCL support not compiled in, using the reference backend");
            execute(&ReferenceBackend::new(), &config, &locator)
        }
    }
}

fn execute<B: ComputeBackend>(
    backend: &B,
    config: &PipelineConfig,
    locator: &ResourceLocator,
) -> Result<i32> {
    let mut reporter = ConsoleReporter::new(io::stdout().lock(), color_enabled());
    let report = Pipeline::new(backend, config, locator).run(&mut reporter)?;
    reporter.report_run(&report);
    info!(
        backend = report.backend,
        device = %report.device.name,
        elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
        "run finished"
    );
    Ok(exit_code_for(&report.validation, config.strict_validation))
}
