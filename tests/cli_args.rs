// tests/cli_args.rs

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tempfile::NamedTempFile;

use cmdstream::cli::{CliArgs, LogLevel};
use cmdstream::config::default_config_path;
use cmdstream::resolve_config;

#[test]
fn defaults_when_no_flags_are_given() {
    let args = CliArgs::try_parse_from(["cmdstream"]).unwrap();
    assert_eq!(args.config, default_config_path());
    assert_eq!(args.config, PathBuf::from("cmdstream.toml"));
    assert!(args.bind.is_none());
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
}

#[test]
fn all_flags_parse() {
    let args = CliArgs::try_parse_from([
        "cmdstream",
        "--config",
        "custom.toml",
        "--bind",
        "0.0.0.0:4000",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config, PathBuf::from("custom.toml"));
    assert_eq!(args.bind, Some(SocketAddr::from(([0, 0, 0, 0], 4000))));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
}

#[test]
fn bad_bind_flag_is_rejected() {
    assert!(CliArgs::try_parse_from(["cmdstream", "--bind", "nowhere"]).is_err());
}

#[test]
fn bind_flag_overrides_the_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[server]\nbind = \"127.0.0.1:5000\"\n").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let from_file = CliArgs::try_parse_from(["cmdstream", "--config", &path]).unwrap();
    assert_eq!(resolve_config(&from_file).unwrap().bind_addr().port(), 5000);

    let overridden =
        CliArgs::try_parse_from(["cmdstream", "--config", &path, "--bind", "127.0.0.1:6000"])
            .unwrap();
    assert_eq!(resolve_config(&overridden).unwrap().bind_addr().port(), 6000);
}

#[test]
fn broken_config_file_is_reported_with_its_path() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[stream]\nchannel_capacity = 0\n").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let args = CliArgs::try_parse_from(["cmdstream", "--config", &path]).unwrap();
    let err = resolve_config(&args).unwrap_err();
    assert!(format!("{err:#}").contains(&path));
    assert!(format!("{err:#}").contains("channel_capacity"));
}
