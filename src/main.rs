use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use certlife::config::{Config, PrometheusConfig, DEFAULT_CONFIG_FILE};
use certlife::report::{self, OutputFormat, Reporter};
use certlife::Checker;

mod metrics;

/// Reports certificate expiry for TLS, SMTP STARTTLS and XMPP STARTTLS endpoints
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Targets to check: host[:port], tls://, https://, smtp:// or xmpp://host[:port]
    targets: Vec<String>,

    /// Configuration file (defaults to ./certlife.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_parser = parse_output)]
    output: Option<OutputFormat>,

    /// Exit code to use when any target fails
    #[arg(long)]
    exit_code: Option<i32>,

    /// Timeout in seconds for each network operation
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Number of targets checked at once
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Accept untrusted and mismatched certificates
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Name announced in SMTP EHLO
    #[arg(long)]
    ehlo_name: Option<String>,

    /// PEM bundle of trust anchors to verify against instead of the system store
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Push metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address
    #[arg(long)]
    prometheus_address: Option<String>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

impl Cli {
    /// Only the values given on the command line, for merging.
    fn to_config(&self) -> Config {
        let prometheus = if self.prometheus || self.prometheus_address.is_some() {
            Some(PrometheusConfig {
                enabled: self.prometheus.then_some(true),
                address: self.prometheus_address.clone(),
            })
        } else {
            None
        };
        Config {
            targets: (!self.targets.is_empty()).then(|| self.targets.clone()),
            output: self.output,
            exit_code: self.exit_code,
            timeout_secs: self.timeout,
            parallelism: self.parallelism,
            verify: self.insecure.then_some(false),
            ehlo_name: self.ehlo_name.clone(),
            ca_file: self.ca_file.clone(),
            color: self.no_color.then_some(false),
            prometheus,
        }
    }
}

fn parse_output(s: &str) -> Result<OutputFormat, String> {
    s.parse()
        .map_err(|_| format!("unknown output format '{}', expected text, json or table", s))
}

fn load_config(cli: &Cli) -> Config {
    let path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));

    let mut config = Config::default();
    if let Some(path) = path {
        match Config::from_file(&path) {
            Ok(file_config) => config = config.merge_with(file_config),
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                exit(2);
            }
        }
    }
    config.merge_with(cli.to_config())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if cli.generate_config {
        print!("{}", Config::example_toml());
        exit(0);
    }

    let config = load_config(&cli);
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        exit(2);
    }
    let targets = match config.parsed_targets() {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("{}", e);
            exit(2);
        }
    };
    debug!("effective configuration: {:?}", config);

    let checker = Checker::new(config.check_options());
    let reports = checker.check_all(&targets, config.parallelism.unwrap_or(1));

    let reporter = Reporter::new(
        config.output.unwrap_or(OutputFormat::Text),
        config.color.unwrap_or(true),
    );
    print!("{}", reporter.render(&reports));

    if let Some(address) = config.prometheus_address() {
        info!("pushing metrics to {}", address);
        metrics::prom::prometheus_metrics(&reports, &address, reporter.now);
    }

    exit(report::exit_code(&reports, config.exit_code.unwrap_or(0)));
}
