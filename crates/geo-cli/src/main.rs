use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use geo_dsl::{apply_source, extract_source};
use geo_scene::Scene;

#[derive(Parser, Debug)]
#[command(name = "geo-cli")]
#[command(about = "Offline tooling for geometry construction scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a script and validate it against a scratch scene
    Check { file: PathBuf },
    /// Apply a script, then print the re-serialized statement sequence
    Roundtrip { file: PathBuf },
    /// Apply a script and print the resulting scene as JSON
    Scene { file: PathBuf },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Check { file } => {
            let source = read_script(&file)?;
            let mut scene = Scene::detached();
            match apply_source(&source, &mut scene) {
                Ok(()) => {
                    println!("ok: {} object(s)", scene.len());
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("invalid: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Roundtrip { file } => {
            let scene = applied_scene(&file)?;
            println!("{}", extract_source(&scene));
            Ok(ExitCode::SUCCESS)
        }
        Command::Scene { file } => {
            let scene = applied_scene(&file)?;
            let payload = serde_json::json!({ "objects": scene.objects() });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_script(file: &Path) -> anyhow::Result<String> {
    fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

fn applied_scene(file: &Path) -> anyhow::Result<Scene> {
    let source = read_script(file)?;
    let mut scene = Scene::detached();
    apply_source(&source, &mut scene)
        .with_context(|| format!("applying {}", file.display()))?;
    Ok(scene)
}
