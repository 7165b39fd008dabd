use clap::Parser;
use eventcore::cli::commands::event::EventCommands;
use eventcore::cli::{Cli, Commands};
use eventcore::domain::models::EventKind;

#[test]
fn test_parse_event_define() {
    let cli = Cli::try_parse_from([
        "eventcore",
        "event",
        "define",
        "--kind",
        "triggered",
        "--path",
        "/plant/alarm",
        "--file",
        "alarm.yaml",
        "--json",
    ])
    .unwrap();

    assert!(cli.json);
    match cli.command {
        Commands::Event(args) => match args.command {
            EventCommands::Define { kind, path, file } => {
                assert_eq!(kind, Some(EventKind::Triggered));
                assert_eq!(path, "/plant/alarm");
                assert_eq!(file.to_str(), Some("alarm.yaml"));
            }
            other => panic!("Wrong event command: {other:?}"),
        },
        Commands::Run(_) => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_event_list_defaults() {
    let cli = Cli::try_parse_from(["eventcore", "event", "list"]).unwrap();
    match cli.command {
        Commands::Event(args) => match args.command {
            EventCommands::List { kind, scope } => {
                assert_eq!(kind, None);
                assert_eq!(scope, "/");
            }
            other => panic!("Wrong event command: {other:?}"),
        },
        Commands::Run(_) => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_run_with_overrides() {
    let cli = Cli::try_parse_from([
        "eventcore",
        "--config",
        "/etc/eventcore.yaml",
        "run",
        "--workers",
        "4",
        "--action-delay-ms",
        "250",
    ])
    .unwrap();

    assert_eq!(cli.config.as_deref().and_then(|p| p.to_str()), Some("/etc/eventcore.yaml"));
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.workers, Some(4));
            assert_eq!(args.action_delay_ms, Some(250));
        }
        Commands::Event(_) => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_rejects_unknown_kind() {
    assert!(Cli::try_parse_from(["eventcore", "event", "list", "--kind", "cron"]).is_err());
}
