use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{json, Value};
use symstore_core::{EntityId, Notification, Scope, Source, Store, StoreConfig, Subscription};
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Load(args) => cmd_load(config, args, cli.format),
        Command::Show(args) => cmd_show(config, args, cli.format),
        Command::Replay(args) => cmd_replay(config, args, cli.format),
        Command::Config(_) => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let Some(path) = path else {
        return Ok(StoreConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn open_store(config: StoreConfig, file: &Path) -> anyhow::Result<Store> {
    let data = read_json(file)?;
    let store = Store::new(config);
    let roots = store
        .load(&data)
        .with_context(|| format!("loading {}", file.display()))?;
    info!(file = %file.display(), roots = roots.len(), records = store.len(), "loaded");
    Ok(store)
}

fn cmd_load(config: StoreConfig, args: LoadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config, &args.file)?;
    let counts: Vec<(String, usize)> = store
        .collection_names()
        .into_iter()
        .map(|t| {
            let n = store.collection_len(t.as_str()).unwrap_or(0);
            (t.to_string(), n)
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let collections: serde_json::Map<String, Value> =
                counts.into_iter().map(|(t, n)| (t, json!(n))).collect();
            println!("{}", json!({"records": store.len(), "collections": collections}));
        }
        OutputFormat::Text => {
            println!(
                "{} Loaded {} records into {} collections",
                "✓".green().bold(),
                store.len().to_string().bold(),
                counts.len()
            );
            for (type_name, n) in counts {
                println!("  {:<24} {}", type_name.cyan(), n);
            }
        }
    }
    Ok(())
}

fn cmd_show(config: StoreConfig, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config, &args.file)?;
    let id: EntityId = args.id.parse()?;
    let Some(handle) = store.find(&args.type_name, id.clone()) else {
        bail!("no {} record with id {}", args.type_name, id);
    };
    let Some(tree) = store.to_json(handle) else {
        bail!("{}#{} could not be rebuilt", args.type_name, id);
    };
    match format {
        OutputFormat::Json => println!("{tree}"),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&tree)?),
    }
    Ok(())
}

/// Outcome of one replayed update.
#[derive(Debug, PartialEq)]
struct ReplayStep {
    changed: bool,
    notifications: Vec<String>,
}

fn cmd_replay(config: StoreConfig, args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config, &args.file)?;
    let updates = match read_json(&args.updates)? {
        Value::Array(items) => items,
        single => vec![single],
    };
    let steps = replay(&store, &updates)?;

    match format {
        OutputFormat::Json => {
            let out: Vec<Value> = steps
                .iter()
                .map(|s| json!({"changed": s.changed, "notifications": s.notifications}))
                .collect();
            println!("{}", Value::Array(out));
        }
        OutputFormat::Text => {
            for (i, step) in steps.iter().enumerate() {
                let flag = if step.changed {
                    "changed".green()
                } else {
                    "unchanged".dimmed()
                };
                println!("{} {}", format!("update #{}", i + 1).yellow().bold(), flag);
                for note in &step.notifications {
                    println!("  {} {}", "→".blue(), note);
                }
            }
        }
    }
    Ok(())
}

/// Watch every collection and every record present after the load, then
/// apply `updates` in order.
fn replay(store: &Store, updates: &[Value]) -> anyhow::Result<Vec<ReplayStep>> {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let subscriptions = watch_all(store, &log)?;
    log.borrow_mut().clear();
    info!(subscriptions = subscriptions.len(), updates = updates.len(), "replaying");

    let mut steps = Vec::with_capacity(updates.len());
    for (i, update) in updates.iter().enumerate() {
        let changed = store
            .update(update)
            .with_context(|| format!("applying update #{}", i + 1))?;
        let notifications = std::mem::take(&mut *log.borrow_mut());
        steps.push(ReplayStep {
            changed,
            notifications,
        });
    }

    for sub in &subscriptions {
        sub.cancel();
    }
    Ok(steps)
}

fn watch_all(store: &Store, log: &Rc<RefCell<Vec<String>>>) -> anyhow::Result<Vec<Subscription>> {
    let mut subscriptions = Vec::new();
    for type_name in store.collection_names() {
        let sink = Rc::clone(log);
        subscriptions.push(store.subscribe(
            Scope::Collection(type_name.clone()),
            move |store, note| sink.borrow_mut().push(describe(store, note)),
        )?);

        for (id, handle) in store.items(type_name.as_str()).unwrap_or_default() {
            // Multi-typed records are watched once, under their first type.
            let primary = store.record(handle).and_then(|r| r.primary_type().cloned());
            if primary.as_ref() != Some(&type_name) {
                continue;
            }
            let sink = Rc::clone(log);
            subscriptions.push(store.subscribe(
                Scope::record(type_name.clone(), id),
                move |store, note| sink.borrow_mut().push(describe(store, note)),
            )?);
        }
    }
    Ok(subscriptions)
}

fn describe(store: &Store, note: &Notification) -> String {
    match &note.source {
        Source::Collection(type_name) => format!(
            "collection {} now has {} records",
            type_name,
            store.collection_len(type_name.as_str()).unwrap_or(0)
        ),
        Source::Record(handle) => {
            let label = store
                .record(*handle)
                .map(|r| match r.primary_type() {
                    Some(t) => format!("{t}#{}", r.id),
                    None => format!("#{}", r.id),
                })
                .unwrap_or_else(|| format!("evicted record {}", handle.index()));
            match &note.field {
                Some(field) => format!("{label}.{field}"),
                None => label,
            }
        }
    }
}

fn cmd_config(config: &StoreConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string(config)?);
    Ok(())
}
