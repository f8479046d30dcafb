//! # l5 CLI
//!
//! Call L5 host functions from a shell.
//!
//! ## Commands
//!
//! - `l5 list` - Print the function table
//! - `l5 call <name> [args...]` - Call one function and print its results
//! - `l5 config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use l5::host::{Library, Value};
use l5::Config;

/// L5 - low-level Linux bindings
#[derive(Parser)]
#[command(name = "l5")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: $L5_CONFIG, then <config_dir>/l5/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the host functions and buffer methods
    List,

    /// Call a host function
    Call {
        /// Function name
        name: String,

        /// Arguments: nil, true, false, integers (decimal or 0x hex),
        /// anything else is a string
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::discover(cli.config.as_deref()).context("Failed to load config")?;
    let lib = Library::new(config);

    match cli.command {
        Commands::List => cmd_list(&lib),
        Commands::Call { name, args } => cmd_call(&lib, &name, &args),
        Commands::Config => cmd_config(&lib),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_list(lib: &Library) -> Result<()> {
    if let Some(version) = lib.field("VERSION") {
        println!("VERSION = {}", version);
    }
    for name in lib.names() {
        println!("{}", name);
    }
    for name in lib.method_names() {
        println!("mb:{}", name);
    }
    Ok(())
}

fn cmd_call(lib: &Library, name: &str, raw: &[String]) -> Result<()> {
    let args: Vec<Value> = raw.iter().map(|s| parse_arg(s)).collect();
    debug!(name, args = ?args, "calling");
    let out = lib
        .call(name, &args)
        .with_context(|| format!("{} failed", name))?;
    let line: Vec<String> = out.iter().map(|v| v.to_string()).collect();
    println!("{}", line.join("\t"));
    Ok(())
}

fn cmd_config(lib: &Library) -> Result<()> {
    let text = toml::to_string_pretty(lib.config()).context("Failed to serialize config")?;
    print!("{}", text);
    Ok(())
}

/// Parse one command-line argument into a host value.
fn parse_arg(s: &str) -> Value {
    match s {
        "nil" => return Value::Nil,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(v) = s.parse::<i64>() {
        return Value::Int(v);
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .and_then(|hex| u64::from_str_radix(hex, 16).ok());
    match hex {
        // full 64-bit patterns wrap, like C integer literals
        Some(v) if negative => Value::Int((v as i64).wrapping_neg()),
        Some(v) => Value::Int(v as i64),
        None => Value::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg_keywords() {
        assert_eq!(parse_arg("nil"), Value::Nil);
        assert_eq!(parse_arg("true"), Value::Bool(true));
        assert_eq!(parse_arg("false"), Value::Bool(false));
    }

    #[test]
    fn test_parse_arg_integers() {
        assert_eq!(parse_arg("42"), Value::Int(42));
        assert_eq!(parse_arg("-1"), Value::Int(-1));
        assert_eq!(parse_arg("0x1000000"), Value::Int(0x0100_0000));
        assert_eq!(parse_arg("0xFFFFFFFFFFFFFFFF"), Value::Int(-1));
    }

    #[test]
    fn test_parse_arg_strings() {
        assert_eq!(parse_arg("/tmp"), Value::from("/tmp"));
        assert_eq!(parse_arg("0xzz"), Value::from("0xzz"));
        assert_eq!(parse_arg("-"), Value::from("-"));
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from(["l5", "call", "kill", "0", "-0"]).unwrap();
        match cli.command {
            Commands::Call { name, args } => {
                assert_eq!(name, "kill");
                assert_eq!(args, vec!["0", "-0"]);
            }
            _ => panic!("expected call"),
        }
    }
}
