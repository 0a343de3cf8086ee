use std::process::ExitCode;

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use sync_service::{
    auth::{CertificateCredential, OAuthTokenProvider, PasswordCredential},
    config::AppConfig,
    metrics_export, observability,
    pipeline::{civil_today, RunMode, SyncPipeline},
    sinks::OpinumSink,
    sources::{short_url::DEFAULT_DATA_PERIOD_FROM, FluviusSource, ShortUrlClient, ShortUrlRequest},
    transform::Normalizer,
};
use time::{macros::format_description, Date};

const EXIT_USAGE: u8 = 1;
const EXIT_ABORTED: u8 = 2;

/// Sync Fluvius quarter-hour readings into Opinum.
#[derive(Parser)]
#[command(name = "fluvius-sync", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync yesterday's readings
    Daily,
    /// Sync the whole previous calendar month
    Monthly,
    /// Sync an inclusive range of days
    Range {
        /// First day, YYYY-MM-DD
        #[arg(value_parser = parse_day)]
        start: Date,
        /// Last day (inclusive), YYYY-MM-DD
        #[arg(value_parser = parse_day)]
        end: Date,
    },
    /// Generate a consumer mandate URL for a data-access contract
    ShortUrl {
        contract_number: String,
        reference_number: String,
        flow: String,
        /// Earliest requested period (RFC 3339)
        #[arg(default_value = DEFAULT_DATA_PERIOD_FROM)]
        data_period_from: String,
    },
}

fn parse_day(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|_| format!("'{s}' is not a YYYY-MM-DD date"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if let Command::Range { start, end } = &cli.command {
        if start > end {
            let _ = Cli::command()
                .error(
                    ErrorKind::ValueValidation,
                    format!("start date {start} is after end date {end}"),
                )
                .print();
            return ExitCode::from(EXIT_USAGE);
        }
    }

    observability::init_tracing();

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("run aborted: {e:#}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    let cfg = AppConfig::load()?;
    let http = cfg.http.client()?;

    let mode = match command {
        Command::Daily => RunMode::Daily,
        Command::Monthly => RunMode::Monthly,
        Command::Range { start, end } => RunMode::Range {
            first: start,
            last: end,
        },
        Command::ShortUrl {
            contract_number,
            reference_number,
            flow,
            data_period_from,
        } => {
            let request = ShortUrlRequest {
                contract_number,
                reference_number,
                flow,
                data_period_from,
            };
            return short_url(&cfg, http, &request).await;
        }
    };

    let exporter = match &cfg.metrics {
        Some(m) => Some((metrics_export::init()?, m.textfile.clone())),
        None => None,
    };

    let zone = cfg.window.zone()?;
    let window = mode.window(civil_today(zone), cfg.window.anchor, zone)?;
    tracing::info!(?mode, from = %window.start(), to = %window.end(), "updating data");

    let tokens = OAuthTokenProvider::new(
        http.clone(),
        CertificateCredential::from_config(&cfg.fluvius.auth)?,
        PasswordCredential::from_config(&cfg.opinum)?,
    );
    let pipeline = SyncPipeline {
        tokens,
        source: FluviusSource::new(http.clone(), &cfg.fluvius)?,
        sink: OpinumSink::new(http, &cfg.opinum),
        normalizer: Normalizer::new(zone),
        registry: cfg.metering_points.clone(),
        report_unrecognized_schema: cfg.sync.report_unrecognized_schema,
    };

    let result = pipeline.run(window).await;
    if let Some((handle, path)) = &exporter {
        if let Err(e) = metrics_export::write_textfile(handle, path) {
            tracing::warn!("metrics not exported: {e:#}");
        }
    }

    let report = result?;
    for entity in &report.outcomes {
        tracing::info!(
            ean = %entity.point.ean,
            variable_id = entity.point.variable_id,
            outcome = ?entity.outcome,
            "metering point done"
        );
    }

    Ok(ExitCode::SUCCESS)
}

async fn short_url(cfg: &AppConfig, http: reqwest::Client, request: &ShortUrlRequest) -> Result<ExitCode> {
    let credential = CertificateCredential::from_config(&cfg.fluvius.auth)?;
    let token = credential.acquire(&http).await?;
    let client = ShortUrlClient::new(http, &cfg.fluvius)?;

    let url = client.generate(&token, request).await?;
    println!("The Fluvius url is the following: {url}");
    Ok(ExitCode::SUCCESS)
}
