//! SwiftScript CLI: build projects to `.ssasm`, run compiled assemblies,
//! or do both in one step.

use std::path::{Path, PathBuf};
use std::process;

use colored::Colorize;

use swiftscript::bytecode::Assembly;
use swiftscript::error::SwiftScriptError;
use swiftscript::project::Project;
use swiftscript::BuildOptions;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Compile a project to bin/<config>/<name>.ssasm
    Build { project: PathBuf },
    /// Run a compiled .ssasm file
    Run { file: PathBuf },
    /// Build a project and run the result
    Exec { project: PathBuf },
    /// Run a bare .ss source file (no project)
    Script { file: PathBuf },
}

/// Build configuration selected with `-c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Config {
    Debug,
    Release,
}

struct Options {
    command: Command,
    config: Config,
    no_type_check: bool,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("SwiftScript {}", VERSION);
    eprintln!();
    eprintln!("Usage: swiftscript <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  build <project.ssproject>   Compile to bin/<config>/<name>.ssasm");
    eprintln!("  run <file.ssasm>            Execute a compiled assembly");
    eprintln!("  exec <project.ssproject>    Build and run");
    eprintln!("  <file.ss>                   Compile and run a single source file");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c Debug|Release            Build configuration (default: Debug)");
    eprintln!("  --no-type-check             Skip the static checking pass");
    eprintln!("  --disassemble               Print bytecode before running");
}

fn parse_args(args: &[String]) -> Option<Options> {
    let mut config = Config::Debug;
    let mut no_type_check = false;
    let mut disassemble = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                i += 1;
                match args.get(i).map(|s| s.as_str()) {
                    Some("Debug") => config = Config::Debug,
                    Some("Release") => config = Config::Release,
                    _ => {
                        eprintln!("error: -c expects Debug or Release");
                        return None;
                    }
                }
            }
            "--no-type-check" => no_type_check = true,
            "--disassemble" => disassemble = true,
            "-h" | "--help" => return None,
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(|s| s.as_str()) {
        Some("build") => Command::Build {
            project: PathBuf::from(positional.get(1)?),
        },
        Some("run") => Command::Run {
            file: PathBuf::from(positional.get(1)?),
        },
        Some("exec") => Command::Exec {
            project: PathBuf::from(positional.get(1)?),
        },
        Some(file) if file.ends_with(".ss") => Command::Script {
            file: PathBuf::from(file),
        },
        Some(file) if file.ends_with(".ssasm") => Command::Run {
            file: PathBuf::from(file),
        },
        _ => return None,
    };

    Some(Options {
        command,
        config,
        no_type_check,
        disassemble,
    })
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(options) = parse_args(&args) else {
        print_usage();
        process::exit(1);
    };

    let build_options = BuildOptions {
        type_check: !options.no_type_check,
        emit_debug: options.config == Config::Debug,
    };

    let result = match &options.command {
        Command::Build { project } => build(project, &options, &build_options).map(|_| ()),
        Command::Run { file } => load_and_run(file, &options),
        Command::Exec { project } => {
            build(project, &options, &build_options).and_then(|out| load_and_run(&out, &options))
        }
        Command::Script { file } => run_script(file, &options, &build_options),
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".red().bold(), err);
        process::exit(1);
    }
}

/// `build`: compile the project and write `bin/<config>/<name>.ssasm`.
fn build(
    project_path: &Path,
    options: &Options,
    build_options: &BuildOptions,
) -> Result<PathBuf, SwiftScriptError> {
    let project = Project::load(project_path)?;
    let assembly = swiftscript::build_project(&project, build_options)?;

    let config_name = match options.config {
        Config::Debug => "Debug",
        Config::Release => "Release",
    };
    let out_dir = project.project_dir.join("bin").join(config_name);
    std::fs::create_dir_all(&out_dir)?;
    let out_file = out_dir.join(format!("{}.ssasm", project.name()));
    assembly.write_file(&out_file)?;

    println!(
        "{} ({}) {}",
        "Build complete".green(),
        config_name,
        out_file.display()
    );
    Ok(out_file)
}

/// `run`: deserialize an `.ssasm` file and execute it.
fn load_and_run(file: &Path, options: &Options) -> Result<(), SwiftScriptError> {
    let assembly = Assembly::read_file(file)?;
    if options.disassemble {
        print!("{}", swiftscript::disassemble(&assembly));
        println!("---");
    }
    swiftscript::run_assembly(assembly)?;
    Ok(())
}

/// Run a bare source file directly.
fn run_script(
    file: &Path,
    options: &Options,
    build_options: &BuildOptions,
) -> Result<(), SwiftScriptError> {
    let source = std::fs::read_to_string(file)?;
    let assembly = swiftscript::compile_source(&source, Some(file), build_options)?;
    if options.disassemble {
        print!("{}", swiftscript::disassemble(&assembly));
        println!("---");
    }
    swiftscript::run_assembly(assembly)?;
    Ok(())
}
