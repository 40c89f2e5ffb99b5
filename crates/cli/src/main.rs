use clap::Parser;
use colored::Colorize;
use replkit_cli::{
    cli::Cli, commands, config::ConfigStore, connect::Endpoints, context::CommandContext, logging,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(ConfigStore::default_path);
    let ctx = CommandContext::new(config_path, Endpoints::default(), true);

    let code = match commands::dispatch(cli.command, &ctx).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", error.to_string().red());
            1
        }
    };
    // Open transports keep background tasks alive; exit explicitly.
    std::process::exit(code);
}
