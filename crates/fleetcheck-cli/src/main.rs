use clap::{CommandFactory, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fleetcheck-cli", version, about = "Fleetcheck CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler service
    Serve,
    /// Compliance group configuration
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },
    /// Driver management
    Driver {
        #[command(subcommand)]
        action: commands::driver::DriverAction,
    },
    /// Check-in inspection and maintenance
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// Reports and statistics
    Report {
        #[command(subcommand)]
        action: commands::report::ReportAction,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve => commands::serve::run(),
        Commands::Group { action } => commands::group::run(action),
        Commands::Driver { action } => commands::driver::run(action),
        Commands::Checkin { action } => commands::checkin::run(action),
        Commands::Report { action } => commands::report::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "fleetcheck-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
