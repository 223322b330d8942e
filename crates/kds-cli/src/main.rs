use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::orders::{OrderAction, TabArg};

#[derive(Parser)]
#[command(name = "kds")]
#[command(about = "Kitchen display order-sync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> device...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Order commands against the upstream
    Orders {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: OrdersCmd,
    },

    /// List kitchen departments
    Departments {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Look up item notes by item code
    Notes {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Item codes
        #[arg(required = true)]
        codes: Vec<String>,
    },
}

#[derive(Subcommand)]
enum OrdersCmd {
    /// Print one page of orders plus tab counts
    List {
        #[arg(long, value_enum, default_value_t = TabArg::Active)]
        tab: TabArg,

        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Department names; repeat or comma-separate. "All" = no filter.
        #[arg(long = "department", value_delimiter = ',')]
        departments: Vec<String>,

        /// Also print per-department item totals for the page
        #[arg(long, default_value_t = false)]
        totals: bool,
    },

    /// Start cooking (NEW -> INPROC)
    Start { code: String },

    /// Complete an order (all lines -> APPROVED)
    Complete { code: String },

    /// Move a completed order back to active
    Undo { code: String },

    /// Abandon cooking (-> NEW)
    Revert { code: String },

    /// Attach modifier lines to an order
    AddModifiers {
        code: String,

        /// Modifier as CODE=Name; repeatable
        #[arg(long = "modifier", required = true)]
        modifiers: Vec<String>,

        /// Parent line id the modifiers belong to
        #[arg(long = "parent-line")]
        parent_line: Option<String>,

        #[arg(long)]
        table: Option<String>,
    },

    /// Re-read an order and evaluate its line statuses
    Verify {
        code: String,

        /// Judge against this target (NEW | INPROC | APPROVED)
        #[arg(long)]
        target: Option<String>,
    },

    /// Submit a whole-order status repeatedly until the header shows it
    Heal {
        code: String,

        #[arg(long)]
        status: String,

        #[arg(long, default_value_t = 3)]
        rounds: u32,

        #[arg(long = "pause-ms", default_value_t = 1500)]
        pause_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; a missing file is not an error.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = kds_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Orders { config_paths, cmd } => {
            let engine = commands::build_engine(&config_paths)?;
            match cmd {
                OrdersCmd::List {
                    tab,
                    page,
                    departments,
                    totals,
                } => commands::orders::list(&engine, tab, page, &departments, totals).await?,
                OrdersCmd::Start { code } => {
                    commands::orders::act(&engine, &code, OrderAction::Start).await?
                }
                OrdersCmd::Complete { code } => {
                    commands::orders::act(&engine, &code, OrderAction::Complete).await?
                }
                OrdersCmd::Undo { code } => {
                    commands::orders::act(&engine, &code, OrderAction::Undo).await?
                }
                OrdersCmd::Revert { code } => {
                    commands::orders::act(&engine, &code, OrderAction::Revert).await?
                }
                OrdersCmd::AddModifiers {
                    code,
                    modifiers,
                    parent_line,
                    table,
                } => {
                    commands::orders::add_modifiers(&engine, &code, &modifiers, parent_line, table)
                        .await?
                }
                OrdersCmd::Verify { code, target } => {
                    commands::orders::verify(&engine, &code, target.as_deref()).await?
                }
                OrdersCmd::Heal {
                    code,
                    status,
                    rounds,
                    pause_ms,
                } => commands::orders::heal(&engine, &code, &status, rounds, pause_ms).await?,
            }
        }

        Commands::Departments { config_paths } => {
            let engine = commands::build_engine(&config_paths)?;
            commands::departments(&engine).await?;
        }

        Commands::Notes {
            config_paths,
            codes,
        } => {
            let engine = commands::build_engine(&config_paths)?;
            commands::notes(&engine, &codes).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
