use std::io::{BufRead, Write};

use clap::Parser;

use mallow::vm::Vm;

#[derive(Parser)]
#[command(
    name = "mallow",
    version,
    about = "A small homoiconic Lisp with a precise tracing heap"
)]
struct Cli {
    /// Script to run; starts a REPL when absent.
    script: Option<String>,

    /// Arguments exposed to the script as *ARGV*.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Evaluate a single expression and print the result.
    #[arg(short, long, value_name = "EXPR")]
    eval: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut vm = Vm::new();

    if let Some(expr) = cli.eval {
        let out = vm.rep(&expr);
        if !out.is_empty() {
            println!("{}", out);
        }
        return;
    }

    if let Some(script) = cli.script {
        vm.run_file(&script, &cli.args);
        return;
    }

    let stdin = std::io::stdin();
    loop {
        print!("user> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let out = vm.rep(&line);
                if !out.is_empty() {
                    println!("{}", out);
                }
            }
        }
    }
}
