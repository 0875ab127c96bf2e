use std::env;

use ember_runtime::{RtResult, Runtime, RuntimeConfig, RuntimeError, StringBox, Value};
use log::LevelFilter;

struct Options {
    verbose: bool,
    config: RuntimeConfig,
    rest: Vec<String>,
}

fn main() {
    let options = match parse_options(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let mut logger = env_logger::Builder::from_default_env();
    if options.verbose {
        logger.filter_module("ember_runtime", LevelFilter::Debug);
    }
    logger.init();

    let Some(command) = options.rest.first() else {
        print_usage();
        std::process::exit(1);
    };

    let result = match command.as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "version" | "--version" | "-v" => {
            print_version();
            Ok(())
        }
        "format" => {
            if options.rest.len() < 2 {
                eprintln!("Error: 'format' command requires a template argument");
                eprintln!("Usage: ember format <template> [values...]");
                std::process::exit(1);
            }
            format_command(options.config, &options.rest[1], &options.rest[2..])
        }
        "modules" => modules_command(options.config),
        _ => {
            eprintln!("Error: Unknown command '{}'", command);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        verbose: false,
        config: RuntimeConfig::new(),
        rest: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" => options.verbose = true,
            "--alias" => {
                let pair = args
                    .next()
                    .ok_or_else(|| "'--alias' requires name=target".to_string())?;
                let (name, target) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid alias '{}', expected name=target", pair))?;
                options.config = options.config.with_alias(name, target);
            }
            _ => options.rest.push(arg),
        }
    }
    let process_args = options.rest.clone();
    options.config = options.config.with_args(process_args);
    Ok(options)
}

fn print_usage() {
    eprintln!("ember runtime tool");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  ember format <template> [values...]  Render a {{{{ key }}}} template");
    eprintln!("  ember modules                        List registered modules");
    eprintln!("  ember help                           Show this help message");
    eprintln!("  ember version                        Show version information");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --verbose             Log module resolution");
    eprintln!("  --alias name=target   Resolve imports of name through target");
    eprintln!();
    eprintln!("Values of the form key=value are collected into one object that");
    eprintln!("comes first; numeric values are passed as numbers.");
}

fn print_version() {
    println!("ember {}", env!("CARGO_PKG_VERSION"));
}

fn parse_value(raw: &str) -> Value {
    match ember_runtime::value::to_float(&Value::from(raw)) {
        Value::Null => Value::from(raw),
        number => number,
    }
}

fn template_values(raw: &[String]) -> Vec<Value> {
    let mut fields = Vec::new();
    let mut positional = Vec::new();
    for item in raw {
        match item.split_once('=') {
            Some((key, value)) if !key.is_empty() => fields.push((key, parse_value(value))),
            _ => positional.push(parse_value(item)),
        }
    }
    if fields.is_empty() {
        return positional;
    }
    let mut values = vec![Value::object(fields)];
    values.extend(positional);
    values
}

fn format_command(config: RuntimeConfig, template: &str, raw: &[String]) -> RtResult<()> {
    let runtime = Runtime::new(config);
    let fmt = runtime.import("fmt")?;
    let printf = fmt
        .get("printf")
        .ok_or_else(|| RuntimeError::NotCallable("fmt.printf".to_string()))?;
    let mut args = vec![Value::String(StringBox::from(template))];
    args.extend(template_values(raw));
    printf.call(&args)?;
    runtime.run_until_idle()?;
    Ok(())
}

fn modules_command(config: RuntimeConfig) -> RtResult<()> {
    let runtime = Runtime::new(config);
    for name in runtime.module_names() {
        let exports = runtime.import(&name)?;
        let names: Vec<&str> = exports.keys().map(String::as_str).collect();
        println!("{} ({}): {}", name, names.len(), names.join(" "));
    }
    Ok(())
}
