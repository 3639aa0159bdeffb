//! `block-run`: execute a JSON program against CSV tables and print the
//! report.
//!
//! Usage: `block-run <program.json> [name=table.csv ...]`

use block_engine::{Environment, Program, Runner, Table};
use std::{env, fs, process};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((program_path, table_args)) = args.split_first() else {
        eprintln!("usage: block-run <program.json> [name=table.csv ...]");
        process::exit(2);
    };
    if let Err(e) = run(program_path, table_args) {
        eprintln!("block-run: {e}");
        process::exit(1);
    }
}

fn run(program_path: &str, table_args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(program_path)?;
    let program = Program::from_str(&text)?;

    let mut env = Environment::new();
    for spec in table_args {
        let (name, file) = spec
            .split_once('=')
            .ok_or("table arguments look like name=file.csv")?;
        let table = Table::from_delimited(&fs::read_to_string(file)?)?;
        env.insert(name.to_string(), table);
    }

    let report = Runner::new().run_with_env(&program, env);
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} pipeline(s) failed", report.failures.len()).into())
    }
}
