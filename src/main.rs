mod cli;
mod config;
mod deadline;
mod error;
mod gate;
mod listener;
mod probe;
mod reporter;
mod session;
#[cfg(test)]
mod testing;

use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{error, info};

use cli::Cli;
use config::ProbeConfig;
use probe::Prober;
use reporter::StatusReporter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let (config, spec) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    let code = match run(&config, &spec).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            e.exit_code()
        }
    };
    ExitCode::from(code)
}

fn prepare(cli: &Cli) -> anyhow::Result<(ProbeConfig, session::SessionSpec)> {
    let mut config = ProbeConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    let log_level = config.get_tracing_level()?;
    let spec = cli.session_spec()?;

    // Init tracing with configured log level
    tracing_subscriber::fmt()
        .with_ansi(std::io::stdout().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("port_checker={}", log_level.as_str().to_lowercase()).parse()?),
        )
        .init();

    Ok((config, spec))
}

async fn run(config: &ProbeConfig, spec: &session::SessionSpec) -> error::ProbeResult<u8> {
    let bind_ip = config
        .bind_ip()
        .map_err(|e| error::ProbeError::Usage(e.to_string()))?;
    let reporter = StatusReporter::new(&config.collector, spec.correlation_id())?;
    let prober = Prober::new(bind_ip, config.backlog);

    let verdict = prober.run(spec, &reporter).await?;
    if verdict.ok() && spec.clients_per_port() == 0 {
        info!("There are zero clients. Exiting early.");
    }
    Ok(probe::exit_code(&verdict))
}
