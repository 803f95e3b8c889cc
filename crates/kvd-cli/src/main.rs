mod crawl;
mod reprocess;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kvd-cli")]
#[command(about = "KVD closed-auction crawler command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl the closed-auctions listing and store every detail page
    Crawl {
        /// 1-based index of the first listing URL to process
        #[arg(long)]
        start: Option<usize>,

        /// 1-based inclusive index of the last listing URL to process
        #[arg(long)]
        end: Option<usize>,

        /// Print records as JSON lines instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Rebuild stored auctions from their retained `objectView` data
    Reprocess {
        /// Maximum number of stored auctions to rebuild
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        limit: Option<i64>,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Verify the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = kvd_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Crawl {
            start,
            end,
            dry_run,
        }) => crawl::run_crawl(&config, start, end, dry_run).await?,
        Some(Commands::Reprocess { limit }) => {
            let pool = kvd_db::connect_pool_from_config(&config).await?;
            reprocess::run_reprocess(&pool, limit).await?;
        }
        Some(Commands::Db { command }) => {
            let pool = kvd_db::connect_pool_from_config(&config).await?;
            match command {
                DbCommands::Ping => {
                    kvd_db::health_check(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = kvd_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        None => println!("kvd-cli: run with --help for available commands"),
    }

    Ok(())
}

#[cfg(test)]
mod tests;
