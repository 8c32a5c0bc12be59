use clap::{CommandFactory, Parser};
use edgar_sync::cli::{CliArgs, RunMode};
use edgar_sync::core::processor;
use edgar_sync::error::{AppError, AppResult};
use edgar_sync::logging::{log, setup_logging, LogLevel};
use std::process::ExitCode;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    let cli_args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            setup_logging(false);
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) {
                let _ = e.print();
                return ExitCode::SUCCESS;
            }
            log(LogLevel::Error, &format!("CLI Argument Error: {}", e));
            let _ = CliArgs::command().print_help();
            return ExitCode::from(2);
        }
    };
    setup_logging(cli_args.is_verbose());

    let runtime = match Builder::new_multi_thread()
        .enable_all()
        .thread_name("edgar-worker")
        .worker_threads(num_cpus::get())
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log(
                LogLevel::Error,
                &format!("FATAL: Failed to build Tokio runtime: {}", e),
            );
            return ExitCode::FAILURE;
        }
    };

    let main_result: AppResult<i32> = runtime.block_on(async {
        let settings = cli_args.to_settings()?;

        let token = CancellationToken::new();
        let signal_token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log(
                    LogLevel::Warning,
                    "Interrupt received; finishing in-flight requests and writing the report.",
                );
                signal_token.cancel();
            }
        });

        match cli_args.get_mode() {
            Some(RunMode::Single(cik)) => processor::run_single(&cik, settings, token).await,
            Some(RunMode::Bulk(path)) => processor::run_bulk(&path, settings, token).await,
            None => Err(AppError::Argument(
                "Either --cik or --bulk is required.".into(),
            )),
        }
    });

    match main_result {
        Ok(exit_code) => ExitCode::from(exit_code.clamp(0, 255) as u8),
        Err(e) => {
            if matches!(e, AppError::Argument(_)) {
                log(LogLevel::Error, &e.to_string());
            } else {
                log(LogLevel::Error, &format!("FATAL ERROR: {}", e));
            }
            ExitCode::FAILURE
        }
    }
}
