//! docindex command line
//!
//! Every command prints one JSON envelope on stdout:
//! `{"status": "ok"|"error", "message"?, "hints"?, "data", "meta"}`. Logs go to stderr
//! (`RUST_LOG` overrides the default `warn` filter).

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod command;
mod store;

use command::domain::{parse_kind, CommandResponse, QueryFlags, StalePolicy};
use command::{QueryRequest, RunOverrides};

#[derive(Parser)]
#[command(name = "docindex", version, about = "Incremental document indexing")]
struct Cli {
    /// Store directory holding documents, index metadata and snapshots.
    #[arg(long, global = true, default_value = ".docindex")]
    store: PathBuf,

    /// Pretty-print the JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save documents from a JSON file and mark them for reindexing.
    Put {
        file: PathBuf,
    },
    /// Mark objects as deleted.
    Delete {
        #[arg(required = true)]
        pointers: Vec<String>,
    },
    /// Bring every index up to date with the stored documents.
    Reindex(ReindexArgs),
    /// Query one index.
    Query(QueryArgs),
    /// Report indexes and the dirty backlog.
    Status,
    /// Print the JSON schema of the query shape.
    Schema,
}

#[derive(Args)]
struct ReindexArgs {
    /// Extra index kind to maintain (e.g. `vector`, `field-match:status`).
    #[arg(long = "kind", value_parser = parse_kind)]
    kinds: Vec<docindex_protocol::IndexKind>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Time budget per pass, in milliseconds.
    #[arg(long)]
    budget_ms: Option<u64>,
    /// Drop stored indexes whose kind is not configured.
    #[arg(long)]
    prune: bool,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, value_parser = parse_kind)]
    kind: docindex_protocol::IndexKind,
    /// Full query as JSON; other query flags are ignored.
    #[arg(long)]
    json: Option<String>,
    #[arg(long = "type")]
    typenames: Vec<String>,
    #[arg(long)]
    inverted: bool,
    #[arg(long)]
    text: Option<String>,
    /// Semantic query text for vector indexes.
    #[arg(long)]
    similar: Option<String>,
    /// Field value (JSON, or a bare string).
    #[arg(long)]
    value: Option<String>,
    #[arg(long)]
    inbound: Vec<String>,
    #[arg(long)]
    relation_source: Vec<String>,
    #[arg(long)]
    relation_target: Vec<String>,
    #[arg(long)]
    property: Option<String>,
    #[arg(long, value_enum, default_value_t = StalePolicy::Auto)]
    stale: StalePolicy,
    #[arg(long, default_value_t = 3000)]
    max_reindex_ms: u64,
    #[arg(long)]
    limit: Option<usize>,
}

impl QueryArgs {
    fn into_request(self) -> QueryRequest {
        QueryRequest {
            kind: self.kind,
            flags: QueryFlags {
                json: self.json,
                typenames: self.typenames,
                inverted: self.inverted,
                text: self.text,
                similar: self.similar,
                value: self.value,
                inbound: self.inbound,
                relation_source: self.relation_source,
                relation_target: self.relation_target,
                property: self.property,
            },
            stale_policy: self.stale,
            max_reindex_ms: self.max_reindex_ms,
            limit: self.limit,
        }
    }
}

async fn dispatch(cli: Cli) -> Result<CommandResponse> {
    let store = cli.store;
    match cli.command {
        Command::Put { file } => command::put(&store, &file).await,
        Command::Delete { pointers } => command::delete(&store, &pointers).await,
        Command::Reindex(args) => {
            let overrides = RunOverrides {
                kinds: args.kinds,
                batch_size: args.batch_size,
                time_budget_ms: args.budget_ms,
                prune: args.prune,
            };
            command::reindex(&store, &overrides).await
        }
        Command::Query(args) => command::query(&store, args.into_request()).await,
        Command::Status => command::status(&store).await,
        Command::Schema => command::schema(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let pretty = cli.pretty;
    let response = match dispatch(cli).await {
        Ok(response) => response,
        Err(err) => {
            log::error!("{err:#}");
            CommandResponse::error(&err)
        }
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{rendered}");

    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
