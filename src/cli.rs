use crate::config::{self, RetryPolicy, RunSettings};
use crate::error::AppResult;
use crate::logging::{log, LogLevel};
use crate::model::partition::RunPartition;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Downloads SEC EDGAR submissions documents for one CIK or a whole catalog.",
    long_about = None,
    arg_required_else_help = true,
    group(ArgGroup::new("mode").required(true).args(["cik", "bulk"]))
)]
pub struct CliArgs {
    #[arg(long, value_name = "CIK", help = "Fetch a single CIK (leading zeros optional)")]
    cik: Option<String>,

    #[arg(
        long,
        value_name = "CATALOG_PATH",
        help = "Fetch every CIK listed in a company catalog JSON file"
    )]
    bulk: Option<PathBuf>,

    #[arg(
        long,
        default_value = config::DEFAULT_OUT_DIR,
        value_name = "DIR_PATH",
        help = "Root directory for partitioned output"
    )]
    output_dir: PathBuf,

    #[arg(long, default_value_t = config::DEFAULT_WORKERS, help = "Concurrent fetch tasks")]
    workers: usize,

    #[arg(
        long,
        default_value_t = config::DEFAULT_DELAY_SECS,
        value_name = "SECONDS",
        help = "Base delay before a retry; the wait grows linearly with the attempt number"
    )]
    delay: f64,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Pause after every request attempt [default: same as --delay]"
    )]
    polite_delay: Option<f64>,

    #[arg(long, default_value_t = config::DEFAULT_RETRY_ATTEMPTS, help = "Attempts per CIK per round")]
    retry_attempts: u32,

    #[arg(
        long,
        default_value_t = config::DEFAULT_BACKOFF_MULTIPLIER,
        help = "Multiplier applied to the retry delay"
    )]
    backoff: f64,

    #[arg(long, default_value_t = config::DEFAULT_MAX_ROUNDS, help = "Upper bound on retry rounds")]
    max_rounds: u32,

    #[arg(long, value_name = "SECONDS", help = "Stop starting new rounds after this long")]
    max_elapsed_secs: Option<f64>,

    #[arg(
        long,
        default_value_t = config::DEFAULT_ROUND_PAUSE_SECS,
        value_name = "SECONDS",
        help = "Pause between rounds"
    )]
    round_pause: f64,

    #[arg(long, value_name = "YYYYMMDD", help = "Output partition [default: today]")]
    partition: Option<String>,

    #[arg(
        long,
        default_value = config::DEFAULT_URL_TEMPLATE,
        help = "Submissions URL; '{id}' is replaced by the 10-digit CIK"
    )]
    url_template: String,

    #[arg(
        long,
        env = "SEC_USER_AGENT",
        default_value = config::DEFAULT_USER_AGENT,
        help = "Identifying User-Agent (name and contact email)"
    )]
    user_agent: String,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,
}

pub enum RunMode {
    Single(String),
    Bulk(PathBuf),
}

impl CliArgs {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn get_mode(&self) -> Option<RunMode> {
        match (&self.cik, &self.bulk) {
            (Some(cik), _) => Some(RunMode::Single(cik.clone())),
            (None, Some(path)) => Some(RunMode::Bulk(path.clone())),
            (None, None) => None,
        }
    }

    pub fn to_settings(&self) -> AppResult<RunSettings> {
        let base_delay = config::secs_to_duration(self.delay, "--delay")?;
        let polite_delay = match self.polite_delay {
            Some(secs) => config::secs_to_duration(secs, "--polite-delay")?,
            None => base_delay,
        };
        let max_elapsed = self
            .max_elapsed_secs
            .map(|secs| config::secs_to_duration(secs, "--max-elapsed-secs"))
            .transpose()?;
        let partition = match self.partition.as_deref() {
            Some(raw) => RunPartition::parse(raw)?,
            None => RunPartition::today(),
        };

        if self.user_agent == config::DEFAULT_USER_AGENT {
            log(
                LogLevel::Warning,
                "Using the placeholder User-Agent; set --user-agent or SEC_USER_AGENT to your own contact details.",
            );
        }

        let settings = RunSettings {
            workers: self.workers,
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                base_delay,
                backoff_multiplier: self.backoff,
                polite_delay,
            },
            max_rounds: self.max_rounds,
            max_elapsed,
            round_pause: config::secs_to_duration(self.round_pause, "--round-pause")?,
            output_root: self.output_dir.clone(),
            url_template: self.url_template.clone(),
            user_agent: self.user_agent.clone(),
            partition,
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("edgar-sync").chain(args.iter().copied()))
    }

    #[test]
    fn mode_flags_are_exclusive_and_required() {
        assert!(parse(&["--cik", "320193", "--bulk", "c.json"]).is_err());
        assert!(parse(&["--workers", "4"]).is_err());
        assert!(matches!(
            parse(&["--cik", "320193"]).unwrap().get_mode(),
            Some(RunMode::Single(_))
        ));
    }

    #[test]
    fn defaults_match_config() {
        let args = parse(&["--bulk", "c.json", "--user-agent", "Acme ops@acme.test"]).unwrap();
        let s = args.to_settings().unwrap();
        assert_eq!(s.workers, config::DEFAULT_WORKERS);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.retry.base_delay, Duration::from_secs(2));
        assert_eq!(s.retry.polite_delay, s.retry.base_delay);
        assert_eq!(s.max_rounds, 5);
        assert_eq!(s.max_elapsed, None);
        assert_eq!(s.output_root, PathBuf::from("data/submissions"));
    }

    #[test]
    fn explicit_values_and_validation() {
        let args = parse(&[
            "--bulk",
            "c.json",
            "--polite-delay",
            "0.5",
            "--partition",
            "20240501",
            "--max-elapsed-secs",
            "60",
        ])
        .unwrap();
        let s = args.to_settings().unwrap();
        assert_eq!(s.retry.polite_delay, Duration::from_millis(500));
        assert_eq!(s.partition.key(), "20240501");
        assert_eq!(s.max_elapsed, Some(Duration::from_secs(60)));

        let bad = parse(&["--bulk", "c.json", "--partition", "2024-05-01"]).unwrap();
        assert!(matches!(bad.to_settings(), Err(AppError::Argument(_))));
        let bad = parse(&["--bulk", "c.json", "--delay=-1"]).unwrap();
        assert!(bad.to_settings().is_err());
        let bad = parse(&["--bulk", "c.json", "--delay", "1e30"]).unwrap();
        assert!(matches!(bad.to_settings(), Err(AppError::Argument(_))));
    }
}
