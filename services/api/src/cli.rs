use crate::demo::{
    run_checklist, run_classify, run_demo, run_extract, ChecklistArgs, ClassifyArgs, DemoArgs,
    ExtractArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use grant_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Grant Intake",
    about = "Classify applicant documents, extract their fields, and track grant checklists",
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
    /// Detect the document type of a text file
    Classify(ClassifyArgs),
    /// Run a single extractor over a text file
    Extract(ExtractArgs),
    /// Print the merged checklist for a set of programs
    Checklist(ChecklistArgs),
    /// Walk a sample case through classification, extraction, merge and checklist updates
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
        Command::Classify(args) => run_classify(args),
        Command::Extract(args) => run_extract(args),
        Command::Checklist(args) => run_checklist(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["grant-intake-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn checklist_collects_repeated_flags() {
        let cli = Cli::try_parse_from([
            "grant-intake-api",
            "checklist",
            "--program",
            "main_street_recovery",
            "--program",
            "veteran_owned_business",
            "--uploaded",
            "Bank_Statements=approved",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Checklist(args)) => {
                assert_eq!(args.programs.len(), 2);
                assert_eq!(args.uploaded.len(), 1);
                assert_eq!(args.uploaded[0].0, "Bank_Statements");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn extract_rejects_malformed_hint() {
        let result = Cli::try_parse_from([
            "grant-intake-api",
            "extract",
            "--doc-type",
            "bank_statement",
            "--file",
            "statement.txt",
            "--hint",
            "statement_date",
        ]);
        assert!(result.is_err());
    }
}
