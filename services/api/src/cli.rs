use crate::infra::build_calculator;
use crate::score::{run_score, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hcc_raf::config::AppConfig;
use hcc_raf::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "hcc-raf",
    about = "Score Medicare risk adjustment factors from diagnoses or claims",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score one beneficiary and print the result as JSON
    Score(ScoreArgs),
    /// List the loaded models
    Models,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
        Command::Models => list_models(),
    }
}

fn list_models() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let calculator = build_calculator(&config.scoring)?;
    for model in calculator.registry().models() {
        let marker = if model == calculator.default_model() { "*" } else { " " };
        println!("{marker} {model}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["hcc-raf"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn score_accepts_comma_separated_codes() {
        let cli = Cli::try_parse_from([
            "hcc-raf", "score", "--age", "67", "--sex", "F", "--dx", "E119,I509", "--dx", "N184",
        ])
        .expect("parses");
        let Some(Command::Score(args)) = cli.command else {
            panic!("expected score command");
        };
        assert_eq!(args.diagnosis_codes, vec!["E119", "I509", "N184"]);
        assert!(!args.no_filter);
    }

    #[test]
    fn score_inputs_are_mutually_exclusive() {
        let err = Cli::try_parse_from([
            "hcc-raf", "score", "--age", "67", "--sex", "F", "--dx", "E119", "--eob", "eob.json",
        ])
        .expect_err("conflicting inputs");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        let err = Cli::try_parse_from([
            "hcc-raf", "score", "--age", "67", "--sex", "F", "--eob", "eob.json", "--x12",
            "claim.837",
        ])
        .expect_err("conflicting inputs");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
