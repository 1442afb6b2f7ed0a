use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use arbor_sdk::OpenMode;

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: hierarchical documents stored in relational tables",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Database file (defaults to ./arbor.db unless a config file sets one)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML connection config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub open_mode: Option<OpenModeArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OpenModeArg {
    MustExist,
    CreateFresh,
    OpenOrCreate,
}

impl From<OpenModeArg> for OpenMode {
    fn from(mode: OpenModeArg) -> Self {
        match mode {
            OpenModeArg::MustExist => OpenMode::MustExist,
            OpenModeArg::CreateFresh => OpenMode::CreateFresh,
            OpenModeArg::OpenOrCreate => OpenMode::OpenOrCreate,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a JSON document as a new object
    Create(CreateArgs),
    /// Print an object or part of it
    Read(ReadArgs),
    /// Write a value at a path
    Modify(ModifyArgs),
    /// Insert values into a list
    Insert(InsertArgs),
    /// Delete paths, or the whole object
    Delete(DeleteArgs),
    /// List objects matching a condition
    Search(SearchArgs),
    /// Print every object
    Dump,
    /// Rebuild the catalog and list sizes from the field tables
    Repair,
    /// Check the stored data for inconsistencies
    Verify,
}

#[derive(Args)]
pub struct CreateArgs {
    /// JSON document; `{"$bytes": "<hex>"}` encodes a byte string
    pub value: String,
    /// Wrap the document so it is stored at this path
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct ReadArgs {
    pub id: i64,
    /// Path in dotted (`a.0.b`, `*` for any index) or JSON-array form
    pub path: Option<String>,
    /// Only return fields matching these masks
    #[arg(long = "mask")]
    pub masks: Vec<String>,
}

#[derive(Args)]
pub struct ModifyArgs {
    pub id: i64,
    pub path: String,
    pub value: String,
    /// Replace whatever is in the way instead of failing
    #[arg(long)]
    pub replace: bool,
}

#[derive(Args)]
pub struct InsertArgs {
    pub id: i64,
    /// List position to insert at; end with `*` to append
    pub target: String,
    #[arg(required = true, num_args = 1..)]
    pub values: Vec<String>,
    #[arg(long)]
    pub replace: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: i64,
    /// Paths to delete; none deletes the whole object
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// JSON term list, e.g. `[{"path": "name", "op": "==", "value": "Alex"}]`
    pub condition: Option<String>,
}
