//! Entry point for the monitorsys client. Parses args, resolves the endpoint and runs the feed.

use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use monitorsys::feed::{FeedClient, FeedConfig, FeedUpdate};
use monitorsys::logging;
use monitorsys::profiles::{ProfileEntry, ProfileRequest, ProfileStore, ResolveProfile};
use monitorsys::scheduler::TokioScheduler;
use monitorsys::summary::Summary;
use monitorsys::types::Snapshot;
use monitorsys::ws::{Transport, WsTransport};
use tokio::sync::oneshot;
use tracing::info;

const URL_ENV: &str = "MONITORSYS_URL";

struct ParsedArgs {
    url: Option<String>,
    tls_ca: Option<String>,
    profile: Option<String>,
    save: bool,
    once: bool,
    dry_run: bool,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--tls-ca CERT_PEM|-t CERT_PEM] [--profile NAME|-P NAME] [--save] [--once] [--dry-run] [ws://HOST:PORT/ws | http://HOST:PORT]"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "monitorsys".into());
    let mut url: Option<String> = None;
    let mut tls_ca: Option<String> = None;
    let mut profile: Option<String> = None;
    let mut save = false;
    let mut once = false;
    let mut dry_run = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--tls-ca" | "-t" => tls_ca = it.next(),
            "--profile" | "-P" => profile = it.next(),
            "--save" => save = true,
            "--once" => once = true,
            "--dry-run" => dry_run = true,
            _ if arg.starts_with("--tls-ca=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        tls_ca = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        profile = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'. {}", usage(&prog)));
            }
            _ => {
                if url.is_none() {
                    url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {}", usage(&prog)));
                }
            }
        }
    }
    Ok(ParsedArgs {
        url,
        tls_ca,
        profile,
        save,
        once,
        dry_run,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };
    logging::init();

    let Some((target, tls_ca)) = resolve_target(&parsed)? else {
        return Ok(());
    };
    let config = FeedConfig::from_target(&target)?;

    if parsed.dry_run {
        println!("{}", config.url);
        return Ok(());
    }

    let transport: Arc<dyn Transport> = match tls_ca.as_deref() {
        Some(path) => Arc::new(WsTransport::with_tls_ca(path)?),
        None => Arc::new(WsTransport::new()),
    };
    let client = FeedClient::with_parts(config, transport, Arc::new(TokioScheduler));

    if parsed.once {
        run_once(client).await
    } else {
        run_until_interrupted(client).await
    }
}

/// Work out (target, tls_ca) from args, env and saved profiles; None means nothing to do.
fn resolve_target(parsed: &ParsedArgs) -> anyhow::Result<Option<(String, Option<String>)>> {
    let store = ProfileStore::open_default();
    let profiles_file = store.load();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        url: parsed
            .url
            .clone()
            .or_else(|| env::var(URL_ENV).ok().filter(|v| !v.is_empty())),
        tls_ca: parsed.tls_ca.clone(),
    };

    let mut profiles_mut = profiles_file.clone();
    let resolved = match req.resolve(&profiles_file) {
        ResolveProfile::Direct(u, t) => {
            if let Some(name) = parsed.profile.as_ref() {
                let entry = ProfileEntry {
                    url: u.clone(),
                    tls_ca: t.clone(),
                };
                let write = match profiles_mut.get(name) {
                    // New profile: auto-save immediately
                    None => true,
                    Some(existing) if *existing != entry => {
                        parsed.save
                            || prompt_yes_no(&format!(
                                "Overwrite existing profile '{name}'? [y/N]: "
                            ))
                    }
                    Some(_) => false,
                };
                if write {
                    profiles_mut.insert(name.clone(), entry);
                    store.save(&profiles_mut)?;
                }
            }
            Some((u, t))
        }
        ResolveProfile::Loaded(u, t) => Some((u, t)),
        ResolveProfile::PromptSelect(names) => {
            eprintln!("Select profile:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            let line = prompt_string("Enter number (or blank to abort): ")?;
            line.trim()
                .parse::<usize>()
                .ok()
                .filter(|idx| *idx >= 1 && *idx <= names.len())
                .and_then(|idx| profiles_mut.get(&names[idx - 1]))
                .map(|entry| (entry.url.clone(), entry.tls_ca.clone()))
        }
        ResolveProfile::PromptCreate(name) => {
            eprintln!("Profile '{name}' does not exist yet.");
            let url = prompt_string("Enter URL (ws://HOST:PORT/ws, wss://... or http(s)://HOST:PORT): ")?;
            if url.trim().is_empty() {
                return Ok(None);
            }
            let ca = prompt_string("Enter TLS CA path (or leave blank): ")?;
            let ca_opt = Some(ca.trim().to_string()).filter(|c| !c.is_empty());
            profiles_mut.insert(
                name,
                ProfileEntry {
                    url: url.trim().to_string(),
                    tls_ca: ca_opt.clone(),
                },
            );
            store.save(&profiles_mut)?;
            Some((url.trim().to_string(), ca_opt))
        }
        ResolveProfile::None => {
            eprintln!("No URL provided and no profiles to select.");
            None
        }
    };
    Ok(resolved)
}

async fn run_until_interrupted(mut client: FeedClient) -> anyhow::Result<()> {
    client.subscribe(|update| match update {
        FeedUpdate::Connection { connected } => {
            info!(connected = *connected, "connection status changed");
        }
        FeedUpdate::Snapshot { snapshot, history } => {
            info!(points = history.cpu.len(), "{}", Summary::from_snapshot(snapshot));
        }
    });
    let handle = client.start();
    tokio::signal::ctrl_c().await?;
    let client = handle.stop().await?;
    info!(
        cpu_points = client.history().cpu.len(),
        gpu_points = client.history().gpu.len(),
        "shutting down"
    );
    Ok(())
}

async fn run_once(mut client: FeedClient) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel::<Snapshot>();
    let mut tx = Some(tx);
    client.subscribe(move |update| {
        if let FeedUpdate::Snapshot { snapshot, .. } = update {
            if let Some(tx) = tx.take() {
                let _ = tx.send(Snapshot::clone(snapshot));
            }
        }
    });
    let handle = client.start();
    let first = tokio::select! {
        s = rx => s.ok(),
        _ = tokio::signal::ctrl_c() => None,
    };
    handle.stop().await?;
    if let Some(snapshot) = first {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}

fn prompt_yes_no(prompt: &str) -> bool {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_ok() {
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    } else {
        false
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}
