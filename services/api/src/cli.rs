use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use membership_lifecycle::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Membership Office",
    about = "Serve and demonstrate the membership application lifecycle",
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
    /// Walk through accept, reject, and member scenarios against in-memory stores
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
    /// Register a non-member applicant account in the in-memory user directory (repeatable)
    #[arg(long = "applicant")]
    pub(crate) applicants: Vec<String>,
    /// Register an existing member account in the in-memory user directory (repeatable)
    #[arg(long = "member")]
    pub(crate) members: Vec<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_collects_repeated_accounts() {
        let cli = Cli::parse_from([
            "membership-api",
            "serve",
            "--port",
            "9090",
            "--applicant",
            "user-1",
            "--applicant",
            "user-2",
            "--member",
            "user-3",
        ]);

        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(9090));
                assert_eq!(args.applicants, ["user-1", "user-2"]);
                assert_eq!(args.members, ["user-3"]);
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn demo_flags_parse() {
        let cli = Cli::parse_from(["membership-api", "demo", "--files", "1", "--json"]);

        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.files, 1);
                assert_eq!(args.company_number, "5560360793");
                assert!(args.json);
                assert!(!args.outstanding_charges);
            }
            other => panic!("expected demo command, got {other:?}"),
        }
    }
}
