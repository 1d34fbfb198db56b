//! CLI command implementations.

use colored::{ColoredString, Colorize};
use lookout_core::{ChangeEvent, ChangeKind, ChangeMask};
use lookout_watcher::{BridgeConfig, TriggerStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// How often `watch` checks whether every watch has gone away.
const LIVENESS_CHECK: Duration = Duration::from_millis(200);

/// Options for the `watch` command.
#[derive(Debug)]
pub struct WatchOptions {
    pub paths: Vec<PathBuf>,
    pub events: String,
    pub mode: Option<String>,
    pub interval_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl WatchOptions {
    /// Builds the bridge config: file first, then command-line overrides.
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };

        if let Some(mode) = &self.mode {
            config.trigger = mode.parse::<TriggerStyle>()?;
        }
        if let Some(ms) = self.interval_ms {
            config.interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Watch paths and print every change until Ctrl-C, or until nothing is
/// left to watch.
pub async fn watch(options: WatchOptions) -> Result<()> {
    let mask = ChangeMask::parse_list(&options.events)?;
    if mask.is_empty() {
        return Err("no change kinds selected".into());
    }
    let config = options.bridge_config()?;

    tokio::task::LocalSet::new()
        .run_until(run_watch(options, mask, config))
        .await
}

#[cfg(target_os = "linux")]
async fn run_watch(options: WatchOptions, mask: ChangeMask, config: BridgeConfig) -> Result<()> {
    use lookout_watcher::InotifyBridge;
    use tokio::time::interval;

    let bridge = InotifyBridge::with_config(&config);

    let json = options.json;
    bridge.on_any(move |event| {
        if let Err(e) = print_event(event, json) {
            tracing::warn!("failed to print event: {}", e);
        }
    });

    for path in &options.paths {
        let registered = registration_path(path);
        let descriptor = bridge.add(registered.as_str(), mask)?;
        tracing::debug!(%descriptor, path = %registered, "watching");
    }

    if !json {
        println!(
            "{} Watching {} path(s) for {} ({} mode)",
            "👁".cyan(),
            bridge.watch_count().to_string().cyan(),
            describe_mask(mask).dimmed(),
            config.trigger
        );
        println!("  Press {} to stop", "Ctrl+C".cyan());
    }

    let mut liveness = interval(LIVENESS_CHECK);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = liveness.tick() => {
                if !bridge.is_active() {
                    tracing::info!("all watches are gone, stopping");
                    break;
                }
            }
        }
    }

    bridge.close();
    if !json {
        println!("{} Stopped", "✓".green());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run_watch(_options: WatchOptions, _mask: ChangeMask, _config: BridgeConfig) -> Result<()> {
    Err("watching requires Linux inotify".into())
}

/// List every change kind with its kernel bit.
pub fn events() -> Result<()> {
    println!("{}", "Change kinds".cyan().bold());
    for kind in ChangeKind::ALL {
        let note = if kind.is_unsolicited() {
            " (always reported)".dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<14} {:#06x}{}",
            kind.name(),
            kind.mask().bits(),
            note
        );
    }
    println!();
    println!("  {:<14} {}", "close".cyan(), close_composite().dimmed());
    println!("  {:<14} {}", "move".cyan(), describe_mask(ChangeMask::MOVE).dimmed());
    println!("  {:<14} {}", "all".cyan(), "every kind above".dimmed());
    Ok(())
}

/// The path string handed to the bridge.
///
/// Child names are appended verbatim, so directories get a trailing `/`.
fn registration_path(path: &Path) -> String {
    let mut registered = path.to_string_lossy().into_owned();
    if path.is_dir() && !registered.ends_with('/') {
        registered.push('/');
    }
    registered
}

fn close_composite() -> String {
    describe_mask(ChangeMask::CLOSE)
}

fn describe_mask(mask: ChangeMask) -> String {
    mask.kinds()
        .map(ChangeKind::name)
        .collect::<Vec<_>>()
        .join(",")
}

fn print_event(event: &ChangeEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        let suffix = if event.is_dir { "/" } else { "" };
        println!("{} {}{}", colorize(event.kind), event.path, suffix);
    }
    Ok(())
}

fn colorize(kind: ChangeKind) -> ColoredString {
    let label = format!("{:<13}", kind.name().to_uppercase());
    match kind {
        ChangeKind::Create | ChangeKind::MovedTo => label.green(),
        ChangeKind::Delete | ChangeKind::DeleteSelf | ChangeKind::MovedFrom => label.red(),
        ChangeKind::Modify | ChangeKind::CloseWrite => label.yellow(),
        ChangeKind::Ignored | ChangeKind::Unmount => label.dimmed(),
        _ => label.normal(),
    }
}
