use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use jtail_journal::EventKind;

#[derive(Parser)]
#[command(
    name = "jtail",
    about = "Follow a block journal: replay its history, then tail it live",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Insert,
    Update,
    Boundary,
}

impl From<KindArg> for EventKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Insert => EventKind::Insert,
            KindArg::Update => EventKind::Update,
            KindArg::Boundary => EventKind::BlockBoundary,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a journal's history and follow its live tail
    Follow(FollowArgs),
    /// Print the blocks a catchup from HEAD would replay
    Walk(WalkArgs),
    /// Decode a JSON-lines file of event records
    Decode(DecodeArgs),
}

#[derive(Args)]
pub struct FollowArgs {
    /// Directory of stored blocks, one `<ref>.json` per block
    #[arg(long)]
    pub blocks: PathBuf,
    /// JSON-lines file the live journal is appended to
    #[arg(long)]
    pub events: PathBuf,
    /// Follower settings (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Skip history and only follow the live tail
    #[arg(long)]
    pub no_catchup: bool,
    /// Only print events of these kinds (repeatable)
    #[arg(long = "kind", value_enum)]
    pub kinds: Vec<KindArg>,
    /// Stop after this many events
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct WalkArgs {
    #[arg(long)]
    pub blocks: PathBuf,
    /// Base58 reference of the head block
    pub head: String,
}

#[derive(Args)]
pub struct DecodeArgs {
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_follow() {
        let cli = Cli::try_parse_from([
            "jtail", "follow", "--blocks", "/b", "--events", "/e.jsonl",
        ])
        .unwrap();
        if let Command::Follow(args) = cli.command {
            assert_eq!(args.blocks, PathBuf::from("/b"));
            assert_eq!(args.events, PathBuf::from("/e.jsonl"));
            assert!(!args.no_catchup);
            assert!(args.kinds.is_empty());
            assert_eq!(args.limit, None);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_follow_filters() {
        let cli = Cli::try_parse_from([
            "jtail", "follow", "--blocks", "b", "--events", "e",
            "--kind", "insert", "--kind", "boundary", "-n", "10", "--no-catchup",
        ])
        .unwrap();
        if let Command::Follow(args) = cli.command {
            assert_eq!(args.kinds, vec![KindArg::Insert, KindArg::Boundary]);
            assert_eq!(args.limit, Some(10));
            assert!(args.no_catchup);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn follow_requires_sources() {
        assert!(Cli::try_parse_from(["jtail", "follow", "--blocks", "b"]).is_err());
    }

    #[test]
    fn parse_walk() {
        let cli = Cli::try_parse_from(["jtail", "walk", "--blocks", "b", "StV1DL6CwTryKyV"]).unwrap();
        if let Command::Walk(args) = cli.command {
            assert_eq!(args.head, "StV1DL6CwTryKyV");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_decode() {
        let cli = Cli::try_parse_from(["jtail", "decode", "events.jsonl"]).unwrap();
        assert!(matches!(cli.command, Command::Decode(_)));
    }

    #[test]
    fn parse_verbose_and_json() {
        let cli = Cli::try_parse_from(["jtail", "-v", "--format", "json", "decode", "f"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn kind_args_map_to_event_kinds() {
        assert_eq!(EventKind::from(KindArg::Boundary), EventKind::BlockBoundary);
        assert_eq!(EventKind::from(KindArg::Update), EventKind::Update);
    }
}
