/// MV3D Terminal Viewer
///
/// Usage: mv3d-terminal [--config FILE.ron] MODEL[=Name] [MODEL[=Name] ...]
///
/// Controls:
///   - Left drag: orbit, right drag: pan, wheel: zoom
///   - F: toggle fullscreen
///   - N/P or Tab: next/previous model
///   - C/O: close/re-open the viewer
///   - Q/ESC: quit

use std::env;
use std::io;
use std::path::PathBuf;

use mv3d_terminal::{ModelEntry, TerminalApp, TerminalConfig};

struct Args {
    config: Option<PathBuf>,
    models: Vec<ModelEntry>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config = None;
    let mut models = Vec::new();
    let mut args = args.peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a file")?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Err(String::new()),
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("unknown option {}", arg));
            }
            _ => models.push(ModelEntry::parse(&arg)),
        }
    }

    if models.is_empty() {
        return Err("no model given".into());
    }
    Ok(Args { config, models })
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_default_env().init();

    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "mv3d-terminal".into());
    let args = match parse_args(argv) {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            eprintln!("Usage: {} [--config FILE.ron] MODEL[=Name] [MODEL[=Name] ...]", program);
            eprintln!("\nMODEL is a .glb/.gltf/.stl path or an http(s) URL");
            std::process::exit(2);
        }
    };

    let config = match &args.config {
        Some(path) => TerminalConfig::load(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?,
        None => TerminalConfig::default(),
    };

    let mut app = TerminalApp::new(args.models, config)?;
    app.run()
}
