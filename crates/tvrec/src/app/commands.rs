use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueHint;
use std::path::PathBuf;

const LONG_ABOUT: &str = "\
Drive a capture device: record, watch live through a ring buffer, or run\n\
helper commands under the process supervisor.\n\
\n\
Channels, inputs and cards come from a JSON channel store (--store).\n\
Recorder settings come from defaults, an optional JSON settings file\n\
(--config) and TVREC_* environment variables.";

const AFTER_LONG_HELP: &str = r#"EXAMPLES:
    # Record channel 1003 on card 1 for ten minutes
    tvrec record --store store.json --card 1 --chanid 1003 --duration 600

    # Watch card 1 live for 30 seconds
    tvrec live --store store.json --card 1 --seconds 30

    # Run a helper with a 5 second timeout
    tvrec exec --timeout 5 -- ffprobe sample.ts

    # Show the effective settings
    tvrec settings --config settings.json"#;

#[derive(Parser)]
#[command(name = "tvrec")]
#[command(author, version, propagate_version = true)]
#[command(about = "Capture device recording coordinator")]
#[command(long_about = LONG_ABOUT)]
#[command(after_long_help = AFTER_LONG_HELP)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Recorder settings file (JSON)
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "TVREC_CONFIG",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, help_heading = "Debug Options")]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command under the process supervisor
    #[command(after_long_help = "\
Exit status is the command's own, 124 on timeout, 127 when the command
cannot be found and 128+N when it died from signal N.")]
    Exec(ExecArgs),

    /// Record a channel now
    Record(RecordArgs),

    /// Watch a card live through its ring buffer
    Live(LiveArgs),

    /// Print the effective recorder settings as JSON
    Settings,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Seconds before the command is terminated (then killed)
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run the words as one /bin/sh command line
    #[arg(long)]
    pub shell: bool,

    /// Let the command write straight to this terminal
    #[arg(long)]
    pub no_buffer: bool,

    /// Return as soon as the command is started
    #[arg(long)]
    pub background: bool,

    /// Command and arguments (use -- before flags of the command)
    #[arg(
        required = true,
        trailing_var_arg = true,
        value_name = "COMMAND",
        value_hint = ValueHint::CommandWithArguments
    )]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Channel store document (JSON)
    #[arg(long, value_name = "FILE", env = "TVREC_STORE", value_hint = ValueHint::FilePath)]
    pub store: PathBuf,

    /// Capture card id
    #[arg(long, value_name = "ID")]
    pub card: u32,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(flatten)]
    pub target: StoreArgs,

    /// Channel id to record
    #[arg(long, value_name = "ID")]
    pub chanid: String,

    /// Recording length in seconds
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    pub duration: u64,

    #[arg(long, default_value = "Manual Recording")]
    pub title: String,

    /// Category (selects the category overrun when it matches)
    #[arg(long, default_value = "")]
    pub category: String,

    /// Recording profile
    #[arg(long, default_value = "Default")]
    pub profile: String,
}

#[derive(Debug, Args)]
pub struct LiveArgs {
    #[command(flatten)]
    pub target: StoreArgs,

    /// How long to stay live
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub seconds: u64,

    /// Picture-in-picture viewer
    #[arg(long)]
    pub pip: bool,
}
