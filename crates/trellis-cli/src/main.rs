//! Trellis CLI
//!
//! Usage:
//!   trellis render [--dir <DIR>] [--ext <EXT>] [--data <FILE>] [--watch] <NAME>
//!   trellis compose [--dir <DIR>] [--json] <NAME>
//!
//! Both commands accept `--config <FILE>` (YAML engine settings) and
//! `--debug`. Log output goes to stderr and is filtered with `RUST_LOG`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use trellis::{Composition, Engine, EngineConfig, RequestContext};

#[derive(Parser)]
#[command(name = "trellis", version)]
#[command(about = "Compose and render layered templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template with JSON data
    Render {
        #[command(flatten)]
        engine: EngineArgs,

        /// JSON file with the render data ("-" reads stdin)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Keep running and render again whenever a template changes
        #[arg(short, long)]
        watch: bool,

        /// Template name without the extension
        name: String,
    },

    /// Print the composed document and the parts it was built from
    Compose {
        #[command(flatten)]
        engine: EngineArgs,

        /// Print the composition as JSON
        #[arg(long)]
        json: bool,

        /// Template name without the extension
        name: String,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Template directory (defaults to the config value, then ".")
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Template file extension, including the dot
    #[arg(short, long)]
    ext: Option<String>,

    /// YAML engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug mode: keep Strip regions verbatim and log compile timings
    #[arg(long)]
    debug: bool,
}

impl EngineArgs {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(dir) = &self.dir {
            config.template_dir = dir.clone();
        }
        if config.template_dir.as_os_str().is_empty() {
            config.template_dir = PathBuf::from(".");
        }
        // Change events carry absolute paths; cache keys must match them.
        config.template_dir = fs::canonicalize(&config.template_dir).with_context(|| {
            format!("template directory {}", config.template_dir.display())
        })?;
        if let Some(ext) = &self.ext {
            config.extension = ext.clone();
        }
        config.debug |= self.debug;
        Ok(config)
    }

    fn engine(&self) -> Result<Engine> {
        let config = self.engine_config()?;
        tracing::debug!(dir = %config.template_dir.display(), ext = %config.extension, "engine ready");
        Ok(Engine::new(config)?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            engine,
            data,
            watch,
            name,
        } => {
            let engine = engine.engine()?;
            let data = load_data(data.as_deref())?;
            let ctx = RequestContext::new();
            if watch {
                run_watch(&engine, &name, &data, &ctx)
            } else {
                render(&engine, &name, &data, &ctx)
            }
        }
        Command::Compose { engine, json, name } => {
            let engine = engine.engine()?;
            let composition = engine
                .compose(&name, &RequestContext::new())
                .with_context(|| format!("composing {}", name))?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if json {
                write_composition_json(&mut out, &composition)?;
            } else {
                write_composition(&mut out, &composition)?;
            }
            Ok(())
        }
    }
}

fn load_data(path: Option<&Path>) -> Result<Value> {
    let text = match path {
        None => return Ok(Value::Object(Default::default())),
        Some(path) if path == Path::new("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading data from stdin")?;
            text
        }
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading data {}", path.display()))?,
    };
    serde_json::from_str(&text).context("parsing render data")
}

fn render(engine: &Engine, name: &str, data: &Value, ctx: &RequestContext) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    engine
        .render(&mut out, name, data, ctx)
        .with_context(|| format!("rendering {}", name))?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn run_watch(engine: &Engine, name: &str, data: &Value, ctx: &RequestContext) -> Result<()> {
    let (tx, rx) = mpsc::channel::<String>();
    engine.on_file_change(move |changed| {
        let _ = tx.send(changed.to_string());
    });
    engine.init().context("watching the template directory")?;

    render(engine, name, data, ctx)?;
    for changed in rx {
        tracing::info!(template = %changed, "template changed, rendering again");
        if let Err(err) = render(engine, name, data, ctx) {
            tracing::error!(error = %err, "render failed");
        }
    }
    Ok(())
}

fn write_composition(out: &mut dyn Write, composition: &Composition) -> io::Result<()> {
    writeln!(out, "{}", composition.document)?;
    let sections: [(&str, Vec<&String>); 3] = [
        ("parents", composition.parents.iter().collect()),
        ("fragments", composition.fragments.keys().collect()),
        ("blocks", composition.blocks.keys().collect()),
    ];
    for (title, names) in sections {
        if names.is_empty() {
            continue;
        }
        writeln!(out, "--- {}", title)?;
        for name in names {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}

fn write_composition_json(out: &mut dyn Write, composition: &Composition) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, composition).context("serializing composition")?;
    writeln!(out)?;
    Ok(())
}
