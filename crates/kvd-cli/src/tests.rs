use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["kvd-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["kvd-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["kvd-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn crawl_defaults_to_full_listing() {
    let cli = Cli::try_parse_from(["kvd-cli", "crawl"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Crawl {
            start: None,
            end: None,
            dry_run: false
        })
    ));
}

#[test]
fn crawl_accepts_range_and_dry_run() {
    let cli = Cli::try_parse_from([
        "kvd-cli",
        "crawl",
        "--start",
        "5",
        "--end",
        "20",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Crawl {
            start: Some(5),
            end: Some(20),
            dry_run: true
        })
    ));
}

#[test]
fn crawl_rejects_negative_start() {
    let result = Cli::try_parse_from(["kvd-cli", "crawl", "--start", "-1"]);
    assert!(result.is_err(), "negative start should be rejected");
}

#[test]
fn reprocess_accepts_limit() {
    let cli = Cli::try_parse_from(["kvd-cli", "reprocess", "--limit", "50"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Reprocess { limit: Some(50) })
    ));
}

#[test]
fn reprocess_rejects_zero_limit() {
    let result = Cli::try_parse_from(["kvd-cli", "reprocess", "--limit", "0"]);
    assert!(result.is_err(), "zero limit should be rejected");
}

#[test]
fn unknown_subcommand_is_rejected() {
    let result = Cli::try_parse_from(["kvd-cli", "collect"]);
    assert!(result.is_err());
}
