//! CLI Tests
//!
//! Argument parsing, JSON envelopes and the config command.

use clap::Parser;
use torrentplay::cli::{parse_source, Cli, Command, ConfigCmd, ExitCode, JsonOutput, Output};
use torrentplay::commands::config_cmd;
use torrentplay::config::Config;
use torrentplay::models::Quality;

// =============================================================================
// Parsing
// =============================================================================

#[test]
fn test_play_defaults() {
    let cli = Cli::parse_from(["torrentplay", "play", "tt0903747", "-s", "720p=http://a/b"]);
    assert!(!cli.json);
    assert!(!cli.verbose);
    let Command::Play(cmd) = cli.command else {
        panic!("Expected Play command");
    };
    assert_eq!(cmd.sources, vec![(Quality::HD720p, "http://a/b".to_string())]);
    assert!(cmd.quality.is_none());
    assert!(cmd.out.is_none());
    assert!(!cmd.keep);
    assert!(cmd.subtitle().is_none());
}

#[test]
fn test_play_alias_and_output_dir() {
    let cli = Cli::parse_from([
        "torrentplay",
        "p",
        "tt0903747",
        "-s",
        "1080p=http://a/b",
        "--out",
        "/srv/media",
    ]);
    let Command::Play(cmd) = cli.command else {
        panic!("Expected Play command");
    };
    assert_eq!(cmd.out.as_deref(), Some(std::path::Path::new("/srv/media")));
}

#[test]
fn test_play_subtitle_selection() {
    let cli = Cli::parse_from([
        "torrentplay",
        "play",
        "tt0903747",
        "-s",
        "720p=http://a/b",
        "--subtitle-url",
        "http://subs/70235",
        "--subtitle-lang",
        "spa",
    ]);
    let Command::Play(cmd) = cli.command else {
        panic!("Expected Play command");
    };
    let subtitle = cmd.subtitle().expect("subtitle selection");
    assert_eq!(subtitle.id, "tt0903747");
    assert_eq!(subtitle.language, "spa");
    assert_eq!(subtitle.url, "http://subs/70235");
}

#[test]
fn test_bad_source_is_rejected() {
    let result = Cli::try_parse_from(["torrentplay", "play", "tt1", "-s", "http://a/b"]);
    assert!(result.is_err());
}

#[test]
fn test_parse_source_keeps_query_string() {
    let (quality, url) = parse_source("2160p=http://a/b?x=1&y=2").unwrap();
    assert_eq!(quality, Quality::UHD4K);
    assert_eq!(url, "http://a/b?x=1&y=2");
}

// =============================================================================
// Output
// =============================================================================

#[test]
fn test_json_error_envelope() {
    let output = JsonOutput::<()>::error_msg("No 720p source", ExitCode::QualityUnavailable);
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["error"], "No 720p source");
    assert_eq!(json["exit_code"], 4);
    assert!(json.get("data").is_none());
}

#[test]
fn test_json_success_envelope_omits_exit_code() {
    let output = JsonOutput::success(serde_json::json!({"status": "playable"}));
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["data"]["status"], "playable");
    assert!(json.get("exit_code").is_none());
    assert!(json.get("error").is_none());
}

// =============================================================================
// Config Command
// =============================================================================

#[test]
fn test_set_limits_requires_a_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let cli = Cli::parse_from(["torrentplay", "config", "set-limits"]);
    let Command::Config(cmd) = cli.command else {
        panic!("Expected Config command");
    };

    let output = Output {
        json: true,
        quiet: true,
    };
    let code = config_cmd(cmd, Config::default(), Some(&path), &output);
    assert_eq!(code, ExitCode::InvalidArgs);
    assert!(!path.exists());
}

#[test]
fn test_set_limits_preserves_other_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let existing = Config {
        download_limit_kbps: Some(500),
        preferred_quality: Some("720p".to_string()),
        ..Default::default()
    };
    existing.save_to(&path).unwrap();

    let cli = Cli::parse_from(["torrentplay", "config", "set-limits", "-u", "64"]);
    let Command::Config(cmd) = cli.command else {
        panic!("Expected Config command");
    };
    let output = Output {
        json: true,
        quiet: true,
    };
    let code = config_cmd(cmd, Config::load_from(&path).unwrap(), Some(&path), &output);
    assert_eq!(code, ExitCode::Success);

    let saved = Config::load_from(&path).unwrap();
    assert_eq!(saved.upload_limit_kbps, Some(64));
    assert_eq!(saved.download_limit_kbps, Some(500));
    assert_eq!(saved.quality(), Some(Quality::HD720p));
}

#[test]
fn test_config_show() {
    let cli = Cli::parse_from(["torrentplay", "config", "show"]);
    assert!(matches!(cli.command, Command::Config(ConfigCmd::Show)));
    let Command::Config(cmd) = cli.command else {
        unreachable!()
    };
    let output = Output {
        json: true,
        quiet: true,
    };
    assert_eq!(config_cmd(cmd, Config::default(), None, &output), ExitCode::Success);
}
