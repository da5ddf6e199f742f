use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};

use stellar::layout::{self, ResolveOptions};
use stellar::stats::{self, MemoryStats};
use stellar::storage::DirBlobStore;
use stellar::{logging, Config, ConstellationId, ConstellationStore, MemoryId, Mood, Pattern, StoreOptions};

enum Command {
    List,
    Patterns,
    Create { name: String, pattern: Option<Pattern> },
    Rename { id: String, name: String },
    SetPattern { id: String, pattern: Pattern },
    Delete { id: String },
    Use { id: Option<String> },
    Add { title: String, image: String, mood: Mood, to: Option<String> },
    Remove { id: String },
    Connections { pattern: Option<Pattern>, group: Option<bool> },
    Group { enabled: bool },
    Stats,
    Timeline,
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Result<Args> {
    parse_args_from(std::env::args().skip(1).collect())
}

fn parse_args_from(args: Vec<String>) -> Result<Args> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut pattern = None;
    let mut mood = None;
    let mut to = None;
    let mut group = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("stellar {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value_for(&args, &mut i, "--config")?));
            }
            "--pattern" | "-p" => {
                pattern = Some(value_for(&args, &mut i, "--pattern")?.parse::<Pattern>().map_err(|e| anyhow!(e))?);
            }
            "--mood" | "-m" => {
                mood = Some(value_for(&args, &mut i, "--mood")?.parse::<Mood>().map_err(|e| anyhow!(e))?);
            }
            "--to" => {
                to = Some(value_for(&args, &mut i, "--to")?.to_string());
            }
            "--group" => group = Some(true),
            "--no-group" => group = Some(false),
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let name = positional.next().unwrap_or_else(|| "list".to_string());
    let mut arg = |what: &str| {
        positional
            .next()
            .ok_or_else(|| anyhow!("'{}' requires {}", name, what))
    };

    let command = match name.as_str() {
        "list" => Command::List,
        "patterns" => Command::Patterns,
        "create" => Command::Create { name: arg("a NAME")?, pattern },
        "rename" => Command::Rename { id: arg("an ID")?, name: arg("a NAME")? },
        "set-pattern" => Command::SetPattern {
            id: arg("an ID")?,
            pattern: pattern.ok_or_else(|| anyhow!("'set-pattern' requires --pattern"))?,
        },
        "delete" => Command::Delete { id: arg("an ID")? },
        "use" => {
            let id = arg("an ID (or 'none')")?;
            Command::Use { id: (id != "none").then_some(id) }
        }
        "add" => Command::Add {
            title: arg("a TITLE")?,
            image: arg("an IMAGE path or URL")?,
            mood: mood.ok_or_else(|| anyhow!("'add' requires --mood"))?,
            to,
        },
        "remove" => Command::Remove { id: arg("an ID")? },
        "connections" => Command::Connections { pattern, group },
        "group" => Command::Group {
            enabled: match arg("on or off")?.as_str() {
                "on" => true,
                "off" => false,
                other => bail!("'group' expects on or off, got '{}'", other),
            },
        },
        "stats" => Command::Stats,
        "timeline" => Command::Timeline,
        other => bail!("Unknown command: {}", other),
    };

    Ok(Args { config_path, command })
}

fn value_for<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn print_help() {
    println!(
        r#"stellar - memories as constellations

USAGE:
    stellar [OPTIONS] <COMMAND>

COMMANDS:
    list                          Constellations and the active one's stars (default)
    patterns                      Available constellation patterns
    create NAME [--pattern P]     New constellation, made active
    rename ID NAME                Rename a constellation
    set-pattern ID --pattern P    Change a constellation's pattern
    delete ID                     Delete a constellation and its memories
    use ID|none                   Select the active constellation
    add TITLE IMAGE --mood M [--to ID]
                                  Add a photo (file path or URL)
    remove ID                     Remove a memory
    connections [--pattern P] [--group|--no-group]
                                  Lines joining the active constellation's stars
    group on|off                  Connect stars per mood by default
    stats                         Summary of the active constellation
    timeline                      Active memories, newest first

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    STELLAR_CONFIG      Path to config file (overrides default location)
    STELLAR_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/stellar/config.toml"#
    );
}

/// Turn a local image file into a data URL; anything else is taken as a URL.
fn image_source(input: &str) -> Result<String> {
    let path = Path::new(input);
    if !path.is_file() {
        return Ok(input.to_string());
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

type Store = ConstellationStore<DirBlobStore>;

fn report_warnings(store: &mut Store) {
    for warning in store.take_warnings() {
        if warning.is_quota() {
            eprintln!("warning: storage is full, latest change is not saved yet ({})", warning);
        } else {
            eprintln!("warning: {}", warning);
        }
    }
}

fn target_constellation(store: &Store, id: Option<String>) -> Result<ConstellationId> {
    match id {
        Some(id) => {
            let id = ConstellationId::from(id);
            store
                .constellation(&id)
                .map(|c| c.id.clone())
                .ok_or_else(|| anyhow!("No constellation with id {}", id))
        }
        None => store
            .active_constellation()
            .map(|c| c.id.clone())
            .ok_or_else(|| anyhow!("No active constellation; create one first")),
    }
}

async fn run(store: &mut Store, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let active = store.active_constellation_id().cloned();
            for c in store.constellations() {
                let marker = if Some(&c.id) == active.as_ref() { "*" } else { " " };
                let count = store
                    .all_memories()
                    .iter()
                    .filter(|m| m.constellation_id == c.id)
                    .count();
                println!("{} {}  {}  [{}]  {} stars", marker, c.id, c.name, c.pattern, count);
            }
            for m in store.active_memories() {
                println!(
                    "    {}  {:<10} ({:>6.1}, {:>6.1})  {}",
                    m.id, m.mood, m.position.x, m.position.y, m.title
                );
            }
        }
        Command::Patterns => {
            for p in Pattern::ALL {
                println!(
                    "{:<12} {:<12} {:>2} stars  {}",
                    p.as_str(),
                    p.label(),
                    layout::stars_required(p),
                    p.description()
                );
            }
        }
        Command::Create { name, pattern } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("Constellation name cannot be empty");
            }
            let pattern = pattern.unwrap_or(store.settings().pattern);
            let c = store.create_constellation(name, pattern)?;
            println!("{}", c.id);
        }
        Command::Rename { id, name } => {
            if name.trim().is_empty() {
                bail!("Constellation name cannot be empty");
            }
            if !store.rename_constellation(&ConstellationId::from(id), name.trim())? {
                eprintln!("No such constellation");
            }
        }
        Command::SetPattern { id, pattern } => {
            if !store.set_constellation_pattern(&ConstellationId::from(id), pattern)? {
                eprintln!("No such constellation");
            }
        }
        Command::Delete { id } => {
            if !store.delete_constellation(&ConstellationId::from(id))? {
                eprintln!("No such constellation");
            }
        }
        Command::Use { id } => {
            let id = match id {
                Some(id) => Some(target_constellation(store, Some(id))?),
                None => None,
            };
            store.set_active_constellation(id)?;
        }
        Command::Add { title, image, mood, to } => {
            let constellation_id = target_constellation(store, to)?;
            let source = image_source(&image)?;
            let memory = store.add_memory(title, source, mood, &constellation_id).await?;
            println!("{}", memory.id);
        }
        Command::Remove { id } => {
            if !store.remove_memory(&MemoryId::from(id))? {
                eprintln!("No such memory");
            }
        }
        Command::Connections { pattern, group } => {
            let settings = store.settings();
            let pattern = pattern
                .or_else(|| store.active_constellation().map(|c| c.pattern))
                .unwrap_or_default();
            let options = ResolveOptions {
                close_loops: store.options().layout.close_loops,
            };
            let memories = store.active_memories();
            let connections = layout::resolve_with(
                pattern,
                memories,
                group.unwrap_or(settings.group_by_mood),
                options,
            );
            for c in connections {
                println!("{} -> {}", c.from.title, c.to.title);
            }
        }
        Command::Group { enabled } => store.set_group_by_mood(enabled)?,
        Command::Stats => {
            let active: Vec<_> = store.active_memories().into_iter().cloned().collect();
            let stats = MemoryStats::compute(&active);
            println!("Stars: {}", stats.total);
            for (mood, count) in stats.mood_counts {
                let (r, g, b) = mood.color();
                println!(
                    "  {:<10} #{:02x}{:02x}{:02x} {:>3}  {:>5.1}%",
                    mood,
                    r,
                    g,
                    b,
                    count,
                    stats.percentage(mood)
                );
            }
            if let Some(mood) = stats.dominant_mood {
                println!("Dominant mood: {}", mood);
            }
            if let Some((month, count)) = &stats.most_active_month {
                println!("Most active month: {} ({} memories)", month, count);
            }
            if let (Some(first), Some(last)) = (stats.first, stats.last) {
                println!("First: {}  Latest: {}", first.title, last.title);
                println!("Days spanned: {}", stats.days_spanned);
            }
        }
        Command::Timeline => {
            let active: Vec<_> = store.active_memories().into_iter().cloned().collect();
            for m in stats::timeline(&active) {
                println!("{}  {:<10} {}", m.created_at.format("%Y-%m-%d %H:%M"), m.mood, m.title);
            }
        }
    }

    report_warnings(store);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Journald on Linux, rolling file otherwise
    let _ = logging::init(Some(config.data_dir.join("logs")));

    let blobs = DirBlobStore::open(config.data_dir.join("store"), config.quota())
        .with_context(|| format!("Failed to open store in {}", config.data_dir.display()))?;
    let mut store = ConstellationStore::open(blobs, StoreOptions::from(&config));

    run(&mut store, args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        parse_args_from(args.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn test_use_requires_an_argument() {
        assert!(parse(&["use"]).is_err());

        let args = parse(&["use", "none"]).unwrap();
        assert!(matches!(args.command, Command::Use { id: None }));

        let args = parse(&["use", "abc"]).unwrap();
        assert!(matches!(args.command, Command::Use { id: Some(ref id) } if id == "abc"));
    }

    #[test]
    fn test_add_requires_mood() {
        assert!(parse(&["add", "Beach", "beach.jpg"]).is_err());

        let args = parse(&["add", "Beach", "beach.jpg", "--mood", "calm", "-c", "/tmp/s.toml"]).unwrap();
        assert!(matches!(args.command, Command::Add { mood: Mood::Calm, to: None, .. }));
        assert_eq!(args.config_path, Some(PathBuf::from("/tmp/s.toml")));
    }

    #[test]
    fn test_defaults_to_list() {
        assert!(matches!(parse(&[]).unwrap().command, Command::List));
        assert!(parse(&["bogus"]).is_err());
    }
}
