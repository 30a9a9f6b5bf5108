use std::env;
use std::process;

use cpuprobe::HostReport;

/// Runtime options
struct Options {
    json: bool,
    show_features: bool,
}

impl Options {
    fn from_args() -> Result<Self, String> {
        let mut json = false;
        let mut show_features = false;

        for arg in env::args().skip(1) {
            match arg.as_str() {
                "--help" | "-h" => return Err(usage()),
                "--json" => json = true,
                "--features" => show_features = true,
                other => return Err(format!("Unknown argument: {other}\n\n{}", usage())),
            }
        }

        Ok(Self {
            json,
            show_features,
        })
    }
}

fn usage() -> String {
    "Usage: cpuprobe [OPTIONS]\n\
     \n\
     Identify the host CPU and its instruction-set extensions.\n\
     \n\
     Options:\n\
     \x20 --json        Print the full report as JSON\n\
     \x20 --features    Also list detected CPU features\n\
     \x20 -h, --help    Show this help"
        .to_string()
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let options = match Options::from_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            process::exit(1);
        }
    };

    if let Err(err) = run(&options) {
        eprintln!("cpuprobe error: {err}");
        process::exit(1);
    }
}

fn run(options: &Options) -> cpuprobe::Result<()> {
    let report = HostReport::collect();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("cpu name:       {}", report.cpu_name);
    if report.physical_cores >= 0 {
        println!("physical cores: {}", report.physical_cores);
    } else {
        println!("physical cores: unknown");
    }
    println!("process triple: {}", report.process_triple);

    if options.show_features {
        match &report.features {
            Some(features) => {
                println!("features:");
                for (name, enabled) in features {
                    let sign = if *enabled { '+' } else { '-' };
                    println!("  {sign}{name}");
                }
            }
            None => println!("features:       not available on this platform"),
        }
    }

    Ok(())
}
