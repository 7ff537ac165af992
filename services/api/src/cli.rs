use crate::demo::{run_demo, run_evaluate, DemoArgs, EvaluateArgs};
use crate::server;
use badge_engine::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Badge Progression Engine",
    about = "Serve, evaluate, and demonstrate badge progression from the command line",
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
    /// Evaluate one answer against a catalog badge without persisting anything
    Evaluate(EvaluateArgs),
    /// Run a scripted session against the in-memory store
    Demo(DemoArgs),
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
        Command::Evaluate(args) => run_evaluate(args),
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["badge-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn evaluate_collects_repeated_options() {
        let cli = Cli::try_parse_from([
            "badge-api",
            "evaluate",
            "--badge",
            "langues",
            "--option",
            "français",
            "--option",
            "anglais",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Evaluate(args)) => {
                assert_eq!(args.badge, "langues");
                assert_eq!(args.options, vec!["français", "anglais"]);
                assert_eq!(args.answer, "");
            }
            other => panic!("expected evaluate, got {other:?}"),
        }
    }
}
