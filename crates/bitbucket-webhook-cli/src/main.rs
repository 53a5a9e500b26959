use bitbucket_webhook_cli::{run_cli, CliError};

fn main() {
    if let Err(e) = run_cli() {
        match &e {
            // clap renders its own usage message
            CliError::Usage(usage) => {
                if usage.print().is_err() {
                    eprintln!("{}", usage);
                }
            }
            other => eprintln!("Error: {}", other),
        }

        std::process::exit(e.exit_code());
    }
}
