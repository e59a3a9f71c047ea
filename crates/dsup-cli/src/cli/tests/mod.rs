//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_run() {
    assert!(matches!(parse(&["dsup", "run"]), CliCommand::Run));
}

#[test]
fn cli_parse_start() {
    match parse(&["dsup", "start", "https://example.com/watch?v=1"]) {
        CliCommand::Start { url } => assert_eq!(url, "https://example.com/watch?v=1"),
        other => panic!("expected Start, got {other:?}"),
    }
}

#[test]
fn cli_parse_pause_and_resume() {
    match parse(&["dsup", "pause", "aB3_-xYz"]) {
        CliCommand::Pause { id } => assert_eq!(id, "aB3_-xYz"),
        other => panic!("expected Pause, got {other:?}"),
    }
    match parse(&["dsup", "resume", "aB3_-xYz"]) {
        CliCommand::Resume { id } => assert_eq!(id, "aB3_-xYz"),
        other => panic!("expected Resume, got {other:?}"),
    }
}

#[test]
fn cli_parse_clear() {
    assert!(matches!(parse(&["dsup", "clear"]), CliCommand::Clear));
}

#[test]
fn cli_parse_status_defaults() {
    match parse(&["dsup", "status"]) {
        CliCommand::Status { limit, json } => {
            assert_eq!(limit, None);
            assert!(!json);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn cli_parse_status_flags() {
    match parse(&["dsup", "status", "--limit", "5", "--json"]) {
        CliCommand::Status { limit, json } => {
            assert_eq!(limit, Some(5));
            assert!(json);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn cli_rejects_missing_arguments() {
    assert!(Cli::try_parse_from(["dsup", "start"]).is_err());
    assert!(Cli::try_parse_from(["dsup", "pause"]).is_err());
    assert!(Cli::try_parse_from(["dsup", "status", "--limit", "many"]).is_err());
}
