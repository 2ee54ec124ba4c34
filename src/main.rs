use std::env;
use std::path::PathBuf;
use std::process::exit;

use ossim_rs::{parse_config_file, write_trace, Engine};

fn main() {
    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "ossim".into());
    let mut config_path: Option<PathBuf> = None;

    for arg in args {
        if let Some(flag) = arg.to_str() {
            match flag {
                "--help" | "-h" => {
                    eprintln!("usage: {} <config-file>", exe.to_string_lossy());
                    exit(0);
                }
                _ if flag.starts_with("--") => {
                    eprintln!("unknown flag: {}", flag);
                    eprintln!("usage: {} <config-file>", exe.to_string_lossy());
                    exit(2);
                }
                _ => {}
            }
        }

        if config_path.is_some() {
            eprintln!("error: expected exactly one configuration file path");
            eprintln!("usage: {} <config-file>", exe.to_string_lossy());
            exit(2);
        }
        config_path = Some(PathBuf::from(arg));
    }

    let Some(config_path) = config_path else {
        eprintln!("usage: {} <config-file>", exe.to_string_lossy());
        exit(2);
    };

    let cfg = match parse_config_file(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            exit(1);
        }
    };
    let log_mode = cfg.log_mode;
    let log_file_path = cfg.log_file_path.clone();

    let engine = match Engine::new(cfg) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            exit(1);
        }
    };

    println!();
    println!("Running Simulation...");
    let trace = match engine.run() {
        Ok(trace) => trace,
        Err(err) => {
            eprintln!("error: {err}");
            exit(1);
        }
    };
    println!();
    println!("Simulation Completed.");

    if let Err(err) = write_trace(&trace.render(), log_mode, log_file_path.as_deref()) {
        eprintln!("error: cannot write trace: {err}");
        exit(1);
    }
}
