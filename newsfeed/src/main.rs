use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use newsfeed::{
    built_info,
    chat::{dispatcher, ErrorReporter, TelegramCommand},
    config::NewsfeedConfig,
    schedule::{news_job, run_cycle, CronScheduler, Scheduler},
};
use schemars::schema_for;
use teloxide::{requests::Requester, utils::command::BotCommands};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the yaml config
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and poll for news (default)
    Run,
    /// Check for news once and exit
    Once,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Output JSON schema of config
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    if let Commands::Config {
        command: ConfigCommands::Schema,
    } = command
    {
        let schema = schema_for!(NewsfeedConfig);
        let schema = serde_json::to_string_pretty(&schema)?;
        println!("{}", schema);
        return Ok(());
    }

    info!(
        "newsfeed {} {}, config {}",
        built_info::PKG_VERSION,
        built_info::TARGET,
        cli.config.display()
    );

    let config = NewsfeedConfig::from_file(&cli.config)?;
    let interval = config.fetch.interval()?;
    let service = Arc::new(config.build()?);
    let bot = service.notifier.bot.clone();
    let reporter = Arc::new(ErrorReporter::new(
        bot.clone(),
        config.telegram.admins.clone(),
    ));

    if let Commands::Once = command {
        run_cycle(&*service, &*reporter).await;
        return Ok(());
    }

    bot.set_my_commands(TelegramCommand::bot_commands()).await?;

    let mut scheduler = CronScheduler::new().await?;
    scheduler
        .run_repeating(interval, news_job(service, reporter.clone()))
        .await?;

    dispatcher(bot, reporter).dispatch().await;

    info!("shutting down");
    scheduler.shutdown().await?;
    Ok(())
}
