use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jtail_follower::{ChainWalker, FollowerConfig, JournalFollower, KindFilter};
use jtail_journal::{EventKind, EventRecord, JournalEvent};
use jtail_store::{BlockCache, DirBlockCache};
use jtail_types::ContentRef;

use crate::cli::*;
use crate::file_source::FileEventSource;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Follow(args) => cmd_follow(args, cli.format).await,
        Command::Walk(args) => cmd_walk(args, cli.format).await,
        Command::Decode(args) => cmd_decode(args, cli.format),
    }
}

async fn cmd_follow(args: FollowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => FollowerConfig::load(path)?,
        None => FollowerConfig::default(),
    };
    if args.no_catchup {
        config.catchup = false;
    }

    let cache = DirBlockCache::open(&args.blocks)
        .with_context(|| format!("opening block directory {}", args.blocks.display()))?;
    let source = FileEventSource::new(&args.events, config.poll_interval());

    let mut follower = JournalFollower::new(Arc::new(cache), Arc::new(source)).with_config(config);
    if !args.kinds.is_empty() {
        let kinds: Vec<EventKind> = args.kinds.iter().copied().map(EventKind::from).collect();
        follower = follower.with_mapper(KindFilter::new(kinds));
    }
    let mut running = follower.start();

    let handle = running.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            handle.cancel();
        }
    });

    let mut printed = 0usize;
    while let Some(item) = running.next().await {
        let event = item?;
        println!("{}", render(&event, format)?);
        printed += 1;
        if args.limit.is_some_and(|limit| printed >= limit) {
            running.cancel();
            break;
        }
    }

    if format == OutputFormat::Text {
        let status = running.status();
        eprintln!(
            "{} {} events (caught up: {})",
            "■".dimmed(),
            printed.to_string().bold(),
            if status.caught_up { "yes".green() } else { "no".yellow() },
        );
    }
    Ok(())
}

async fn cmd_walk(args: WalkArgs, format: OutputFormat) -> anyhow::Result<()> {
    let head = ContentRef::from_base58(&args.head)
        .with_context(|| format!("invalid head reference {:?}", args.head))?;
    let cache = Arc::new(
        DirBlockCache::open(&args.blocks)
            .with_context(|| format!("opening block directory {}", args.blocks.display()))?,
    );

    let walker = ChainWalker::new(cache.clone(), &FollowerConfig::default());
    let outcome = walker.walk(head, &CancellationToken::new()).await?;

    for (i, reference) in outcome.plan.iter().enumerate() {
        let entries = cache.get(reference)?.map(|b| b.entries.len()).unwrap_or(0);
        match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "index": i, "block": reference, "entries": entries })
            ),
            OutputFormat::Text => println!(
                "{:>4}  {}  {} entries",
                i.to_string().dimmed(),
                reference.to_string().cyan(),
                entries
            ),
        }
    }

    if format == OutputFormat::Text {
        if outcome.reached_genesis {
            println!("{} {} blocks back to genesis", "✓".green().bold(), outcome.plan.len());
        } else {
            println!(
                "{} history truncated after {} blocks",
                "!".yellow().bold(),
                outcome.plan.len()
            );
        }
    }
    Ok(())
}

fn cmd_decode(args: DecodeArgs, format: OutputFormat) -> anyhow::Result<()> {
    for event in decode_file(&args.file)? {
        println!("{}", render(&event, format)?);
    }
    Ok(())
}

/// Decode every non-blank line; the first invalid line fails the file.
fn decode_file(path: &Path) -> anyhow::Result<Vec<JournalEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            EventRecord::decode_json(line.trim())
                .with_context(|| format!("{}:{}", path.display(), i + 1))
        })
        .collect()
}

fn render(event: &JournalEvent, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(EventRecord::from(event).to_json()?);
    }
    let line = match event {
        JournalEvent::InsertCanonical { reference } => {
            format!("{} {}", "insert".green(), reference)
        }
        JournalEvent::UpdateChain {
            canonical,
            chain,
            previous_chain,
        } => match previous_chain {
            Some(prev) => format!(
                "{} {} -> {} {}",
                "update".yellow(),
                canonical,
                chain,
                format!("(was {prev})").dimmed()
            ),
            None => format!("{} {} -> {}", "update".yellow(), canonical, chain),
        },
        JournalEvent::BlockBoundary { reference } => {
            format!("{} {}", "── block".cyan().bold(), reference.to_string().cyan())
        }
    };
    Ok(line)
}
