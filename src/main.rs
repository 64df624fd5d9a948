//! # scanshelf CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf index` | Group new captures into batches |
//! | `shelf status` | Count indexed and unindexed captures |
//! | `shelf decide <file>` | Record a review decision |
//! | `shelf archive` | Copy decided captures into the archive |
//! | `shelf reconcile` | Move documents to match their sidecars |
//! | `shelf dedupe` | List probable duplicate receipts |
//! | `shelf adjacent` | Receipts near a time with the same cost |
//! | `shelf toss <file>` | Move an archived document to `tossed/` |
//! | `shelf marked accept/toss` | Resolve a marked capture |
//! | `shelf names ...` | Cluster, merge and look up merchant names |
//!
//! ## Examples
//!
//! ```bash
//! shelf index --dry-run
//! shelf decide 03052024100000_1.jpg --verdict accepted --type receipt \
//!     --name "Cafe" --date 2024-03-05 --time 10:00 --cost 4.5 --currency EUR
//! shelf archive
//! shelf names clusters --threshold 0.15
//! shelf names merge "Cafe" "Cafe " "CAFE"
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use scanshelf::{archive, config, dedupe_cmd, index_cmd, names, reconcile_cmd, staging};
use scanshelf_core::models::{Decision, DocumentType, Verdict};

/// scanshelf: organize photographed documents into a dated archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "shelf", version, about = "Organize photographed documents into a dated archive")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group unindexed captures into batches and update `batches.json`.
    Index {
        /// Show the batches that would be created without saving.
        #[arg(long)]
        dry_run: bool,
    },

    /// Count input captures, indexed and unindexed.
    Status,

    /// Record a review decision for a capture.
    ///
    /// Accepted receipts need a cost and a currency.
    Decide {
        file: String,
        #[command(flatten)]
        decision: DecisionArgs,
    },

    /// Copy decided captures into the archive with their sidecars.
    Archive {
        #[arg(long)]
        dry_run: bool,
    },

    /// Move archived documents to where their decisions place them.
    Reconcile {
        #[arg(long)]
        dry_run: bool,
    },

    /// List clusters of probable duplicate receipts.
    Dedupe,

    /// List receipts within five minutes of a time with the same cost.
    Adjacent {
        /// `YYYY-MM-DD`
        #[arg(long)]
        date: String,
        /// `HH:MM[:SS]`
        #[arg(long)]
        time: String,
        #[arg(long)]
        cost: f64,
        /// Original filename to leave out of the results.
        #[arg(long)]
        exclude: Option<String>,
    },

    /// Move an archived document (by original filename) to `tossed/`.
    Toss { file: String },

    /// Resolve captures in the marked pool.
    Marked {
        #[command(subcommand)]
        action: MarkedAction,
    },

    /// Merchant name clustering and normalization.
    Names {
        #[command(subcommand)]
        action: NamesAction,
    },
}

#[derive(Subcommand)]
enum MarkedAction {
    /// Accept a marked capture into the archive.
    Accept {
        file: String,
        #[command(flatten)]
        decision: DecisionArgs,
    },
    /// Move a marked capture to `tossed/`.
    Toss { file: String },
}

#[derive(Subcommand)]
enum NamesAction {
    /// Show clusters of similar names.
    Clusters {
        /// `string` or `embedding`; defaults to `names.engine`.
        #[arg(long)]
        engine: Option<String>,
        /// Distance threshold in (0, 1].
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Map variant spellings onto the canonical form of a target name.
    Merge {
        target: String,
        #[arg(required = true)]
        variants: Vec<String>,
    },
    /// Record that two names are different merchants.
    Distinct { a: String, b: String },
    /// Forget a recorded distinct pair.
    Undistinct { a: String, b: String },
    /// List recorded distinct pairs.
    Pairs,
    /// Names close to a given name.
    Similar {
        name: String,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Confirmed names previously chosen for similar extracted names.
    Suggest {
        query: String,
        #[arg(long)]
        top: Option<usize>,
    },
}

/// Review decision flags shared by `decide` and `marked accept`.
#[derive(Args)]
struct DecisionArgs {
    /// `accepted`, `marked` or `tossed`.
    #[arg(long, default_value = "accepted")]
    verdict: String,
    /// `receipt`, `other` or `corrupted`.
    #[arg(long = "type", default_value = "receipt")]
    document_type: String,
    #[arg(long, default_value = "")]
    name: String,
    /// `YYYY-MM-DD`; empty when undated.
    #[arg(long, default_value = "")]
    date: String,
    #[arg(long, default_value = "")]
    time: String,
    #[arg(long, default_value_t = 0.0)]
    cost: f64,
    #[arg(long, default_value = "")]
    currency: String,
}

impl DecisionArgs {
    fn into_decision(self) -> anyhow::Result<Decision> {
        let verdict: Verdict = self.verdict.parse().map_err(anyhow::Error::msg)?;
        let document_type: DocumentType =
            self.document_type.parse().map_err(anyhow::Error::msg)?;
        Ok(Decision {
            verdict,
            document_type,
            name: self.name,
            date: self.date,
            time: self.time,
            cost: self.cost,
            currency: self.currency,
        })
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanshelf=info,scanshelf_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { dry_run } => index_cmd::run_index(&cfg, dry_run)?,
        Commands::Status => index_cmd::run_status(&cfg)?,
        Commands::Decide { file, decision } => {
            staging::run_decide(&cfg, &file, decision.into_decision()?)?;
        }
        Commands::Archive { dry_run } => archive::run_archive(&cfg, dry_run)?,
        Commands::Reconcile { dry_run } => reconcile_cmd::run_reconcile(&cfg, dry_run)?,
        Commands::Dedupe => dedupe_cmd::run_dedupe(&cfg)?,
        Commands::Adjacent {
            date,
            time,
            cost,
            exclude,
        } => dedupe_cmd::run_adjacent(&cfg, &date, &time, cost, exclude.as_deref())?,
        Commands::Toss { file } => archive::run_toss_archived(&cfg, &file)?,
        Commands::Marked { action } => match action {
            MarkedAction::Accept { file, decision } => {
                archive::run_accept_marked(&cfg, &file, decision.into_decision()?)?;
            }
            MarkedAction::Toss { file } => archive::run_toss_marked(&cfg, &file)?,
        },
        Commands::Names { action } => match action {
            NamesAction::Clusters { engine, threshold } => {
                names::run_clusters(&cfg, engine.as_deref(), threshold).await?;
            }
            NamesAction::Merge { target, variants } => {
                names::run_merge(&cfg, &target, &variants)?;
            }
            NamesAction::Distinct { a, b } => names::run_distinct(&cfg, &a, &b)?,
            NamesAction::Undistinct { a, b } => names::run_undistinct(&cfg, &a, &b)?,
            NamesAction::Pairs => names::run_pairs(&cfg)?,
            NamesAction::Similar {
                name,
                threshold,
                top,
            } => names::run_similar(&cfg, &name, threshold, top).await?,
            NamesAction::Suggest { query, top } => names::run_suggest(&cfg, &query, top)?,
        },
    }

    Ok(())
}
