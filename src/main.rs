use std::io::{self, Read};

use clap::Parser as ClapParser;
use fennel::output::{from_json, to_json, to_json_pretty};
use fennel::value::Value;

#[derive(ClapParser)]
#[command(name = "fennel")]
#[command(about = "Fennel - evaluate reactive-engine expressions against JSON state")]
#[command(version)]
struct Cli {
    /// The expression to evaluate
    expression: String,

    /// JSON context (reads from stdin if not provided)
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,

    /// Only validate syntax, don't evaluate
    #[arg(long)]
    syntax_only: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let compiled = fennel::parse(&cli.expression).map_err(|e| e.to_string())?;
    if cli.syntax_only {
        println!("syntax ok");
        return Ok(());
    }

    let input = match cli.input {
        Some(text) => Some(text),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| e.to_string())?;
            Some(buffer)
        }
        None => None,
    };

    let context = match input {
        Some(text) if !text.trim().is_empty() => {
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| format!("invalid JSON input: {}", e))?;
            match from_json(&json) {
                Value::Object(obj) => obj,
                _ => return Err("JSON context must be an object".to_string()),
            }
        }
        _ => fennel::ObjectRef::new(),
    };

    let result = compiled.eval(&context, None).map_err(|e| e.to_string())?;
    if cli.pretty {
        println!("{}", to_json_pretty(&result));
    } else {
        println!("{}", to_json(&result));
    }
    Ok(())
}
