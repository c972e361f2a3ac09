// Command line front end
//
//   tonelink [--defaults FILE] [--extensions FILE] [TARGET INPUT [DEVICE]]
//
// Without a target it lists playback devices and configured target systems.
// With one it reads INPUT, encodes it and plays it on DEVICE, falling back to
// the saved default device.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tonelink::extensions::ProviderRegistry;
use tonelink::task::{ChannelListener, ListenerMessage, TaskEvent};
use tonelink::{logging, AppState, RunState};

const DEFAULTS_FILE: &str = "defaults.json";
const EXTENSIONS_FILE: &str = "extensions.json";

struct Args {
    defaults: PathBuf,
    extensions: PathBuf,
    positional: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        defaults: PathBuf::from(DEFAULTS_FILE),
        extensions: PathBuf::from(EXTENSIONS_FILE),
        positional: Vec::new(),
    };
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--defaults" => args.defaults = iter.next().context("--defaults needs a path")?.into(),
            "--extensions" => {
                args.extensions = iter.next().context("--extensions needs a path")?.into()
            }
            _ => args.positional.push(arg),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = parse_args()?;
    let state = AppState::load(&args.defaults, &args.extensions, ProviderRegistry::with_builtin())?;

    let (target, input) = match args.positional.as_slice() {
        [] => {
            println!("Playback devices:");
            for descriptor in state.catalog.descriptors() {
                println!("  {} ({})", descriptor.name, descriptor.description);
            }
            println!("Target systems:");
            for name in state.registry().list_target_system_names() {
                println!("  {}", name);
            }
            println!("Registered providers:");
            for id in state.providers.identifiers() {
                println!("  {}", id);
            }
            return Ok(());
        }
        [target, input, ..] => (target.clone(), PathBuf::from(input)),
        [_] => bail!("an input file is needed after the target system name"),
    };

    let preferences = state.preferences();
    let device = match args.positional.get(2).or(preferences.output_device_name.as_ref()) {
        Some(device) => device.clone(),
        None => state
            .catalog
            .list_names()
            .into_iter()
            .next()
            .context("no playback device available")?,
    };

    let mut file = File::open(&input).with_context(|| format!("cannot open {:?}", input))?;
    let payload = state.read_payload(&target, &mut file)?;

    let (listener, mut rx) = ChannelListener::new();
    let transfer = state.start_transfer(&target, &device, &payload, Arc::new(listener))?;

    while let Some(message) = rx.recv().await {
        match message {
            ListenerMessage::Event(TaskEvent::Progress(percent)) => {
                tracing::info!("{}% sent", percent)
            }
            ListenerMessage::Event(TaskEvent::Message(text)) => tracing::info!("{}", text),
            ListenerMessage::Event(TaskEvent::Failed(reason)) => {
                tracing::error!("transfer failed: {}", reason)
            }
            ListenerMessage::Event(TaskEvent::Cancelled) => tracing::warn!("transfer cancelled"),
            ListenerMessage::Done => break,
        }
    }

    match transfer.task.state() {
        RunState::Completed => Ok(()),
        other => bail!("transfer ended {:?}", other),
    }
}
