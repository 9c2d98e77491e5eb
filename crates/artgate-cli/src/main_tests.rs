//! CLI tests

use std::path::Path;

use clap::Parser;

use crate::{Cli, Commands, ConfigAction, OutputFormat, ToolArgs, output_path, shorten};
use artgate_core::generation::ToolRequest;
use artgate_core::routing::ProviderName;

#[test]
fn test_cli_definition_is_valid() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn test_generate_args_parse() {
    let cli = Cli::try_parse_from([
        "artgate", "generate", "a knight", "--provider", "horde", "--seed", "7", "--style", "nes",
    ])
    .unwrap();
    let Commands::Generate(args) = cli.command else {
        panic!("expected generate");
    };
    assert_eq!(args.prompt, "a knight");
    assert_eq!(args.provider, Some(ProviderName::StableHorde));
    assert_eq!(args.seed, Some(7));
    assert!(args.tool.is_none());
}

#[test]
fn test_failover_conflicts_with_provider() {
    let result = Cli::try_parse_from([
        "artgate", "generate", "x", "--provider", "fal", "--failover",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_api_key_is_bound_to_an_explicit_provider() {
    assert!(Cli::try_parse_from(["artgate", "generate", "x", "--api-key", "users-fal-key"]).is_err());
    assert!(
        Cli::try_parse_from([
            "artgate", "generate", "x", "--failover", "--api-key", "users-fal-key",
        ])
        .is_err()
    );

    let cli = Cli::try_parse_from([
        "artgate", "generate", "x", "--provider", "fal", "--api-key", "users-fal-key",
    ])
    .unwrap();
    let Commands::Generate(args) = cli.command else {
        panic!("expected generate");
    };
    assert_eq!(args.provider, Some(ProviderName::Fal));
    assert_eq!(args.api_key.as_deref(), Some("users-fal-key"));
}

#[test]
fn test_failover_conflicts_with_count() {
    assert!(Cli::try_parse_from(["artgate", "generate", "x", "--failover", "--count", "3"]).is_err());
    assert!(Cli::try_parse_from(["artgate", "generate", "x", "--failover"]).is_ok());
}

#[test]
fn test_tool_subcommand_becomes_request() {
    let cli = Cli::try_parse_from([
        "artgate", "generate", "slime", "animate", "--frames", "6",
    ])
    .unwrap();
    let Commands::Generate(args) = cli.command else {
        panic!("expected generate");
    };
    let request: ToolRequest = args.tool.unwrap().into();
    match request {
        ToolRequest::Animate(extra) => {
            assert_eq!(extra.frames, 6);
            assert_eq!(extra.fps, 8);
            assert!(extra.looping);
        }
        other => panic!("unexpected request: {other:?}"),
    }
}

#[test]
fn test_rotate_requires_reference() {
    assert!(Cli::try_parse_from(["artgate", "generate", "x", "rotate"]).is_err());
    let cli = Cli::try_parse_from(["artgate", "generate", "x", "rotate", "https://img/a.png"]).unwrap();
    let Commands::Generate(args) = cli.command else {
        panic!("expected generate");
    };
    assert!(matches!(args.tool, Some(ToolArgs::Rotate { directions: 4, .. })));
}

#[test]
fn test_global_format_flag() {
    let cli = Cli::try_parse_from(["artgate", "providers", "--format", "json"]).unwrap();
    assert!(cli.format == OutputFormat::Json);
    assert!(matches!(cli.command, Commands::Providers));
}

#[test]
fn test_config_set_parses() {
    let cli = Cli::try_parse_from(["artgate", "config", "set", "routing.prefer_hd", "true"]).unwrap();
    match cli.command {
        Commands::Config {
            action: ConfigAction::Set { key, value },
        } => {
            assert_eq!(key, "routing.prefer_hd");
            assert_eq!(value, "true");
        }
        _ => panic!("expected config set"),
    }
}

#[test]
fn test_output_path_numbers_extra_images() {
    let base = Path::new("out/hero.png");
    assert_eq!(output_path(base, 0, "jpg"), Path::new("out/hero.png"));
    assert_eq!(output_path(base, 2, "jpg"), Path::new("out/hero-3.png"));
    assert_eq!(output_path(Path::new("sprite"), 0, "webp"), Path::new("sprite.webp"));
}

#[test]
fn test_shorten_hides_data_uris() {
    assert_eq!(shorten("https://x/y.png"), "https://x/y.png");
    let short = shorten("data:image/png;base64,AAAA");
    assert!(short.starts_with("<image/png data"));
}
