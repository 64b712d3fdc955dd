//! snippet-session: parse a snippet body and print its node tree

use std::error::Error;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use snippet_session::config::EngineConfig;
use snippet_session::parser::{normalize, parse, Context, NormalizeOptions};

#[derive(Parser)]
#[command(name = "snippet-session")]
#[command(about = "Parse a snippet body and print its node tree as YAML")]
struct Args {
    /// Snippet body; read from stdin when omitted
    body: Option<String>,

    /// Print the tree as parsed, without normalization
    #[arg(long)]
    raw: bool,

    /// Lookup entry for a tabstop id or variable name (repeatable)
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_lookup)]
    lookup: Vec<(String, String)>,

    /// YAML engine configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn parse_lookup(entry: &str) -> Result<(String, String), String> {
    entry
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {entry:?}"))
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(yaml) => {
            print!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<String, Box<dyn Error>> {
    let body = match args.body {
        Some(body) => body,
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            input.strip_suffix('\n').unwrap_or(&input).to_string()
        }
    };

    let nodes = parse(body)?;
    tracing::debug!(nodes = nodes.len(), "parsed snippet");
    if args.raw {
        return Ok(serde_yaml::to_string(&nodes)?);
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.lookup.extend(args.lookup);
    config.validate()?;

    let context = Context {
        workspace_folder: std::env::current_dir().ok(),
        ..Context::default()
    };
    let nodes = normalize(
        &nodes,
        &NormalizeOptions {
            lookup: Some(&config.lookup),
            context: Some(&context),
        },
    );
    Ok(serde_yaml::to_string(&nodes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(body: &str) -> Args {
        Args {
            body: Some(body.to_string()),
            raw: false,
            lookup: Vec::new(),
            config: None,
        }
    }

    #[test]
    fn test_parse_lookup_entry() {
        assert_eq!(
            parse_lookup("AUTHOR=a=b"),
            Ok(("AUTHOR".to_string(), "a=b".to_string()))
        );
        assert!(parse_lookup("AUTHOR").is_err());
    }

    #[test]
    fn test_raw_output_keeps_missing_final_tabstop() {
        let yaml = run(Args {
            raw: true,
            ..args("${1:x}")
        })
        .unwrap();
        assert!(yaml.contains("kind: tabstop"));
        assert!(!yaml.contains("id: '0'"));
    }

    #[test]
    fn test_normalized_output_uses_lookup() {
        let yaml = run(Args {
            lookup: vec![("1".to_string(), "filled".to_string())],
            ..args("${1:x}")
        })
        .unwrap();
        assert!(yaml.contains("text: filled"));
        assert!(yaml.contains("id: '0'"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = run(args("${1|a")).unwrap_err();
        assert!(err.to_string().contains("choice"));
    }

    #[test]
    fn test_invalid_lookup_key_is_reported() {
        let err = run(Args {
            lookup: vec![("a b".to_string(), "x".to_string())],
            ..args("$1")
        })
        .unwrap_err();
        assert!(err.to_string().contains("a b"));
    }
}
