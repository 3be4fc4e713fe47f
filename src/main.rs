//! `focusdeck`: recurring tasks, focus blocks and the today cockpit from the
//! command line. See the library docs for an overview.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use focusdeck::clock::SystemClock;
use focusdeck::commands::*;
use focusdeck::config::Config;
use focusdeck::models::{Context, Priority};
use focusdeck::storage::JsonStore;

#[derive(Parser)]
#[command(name = "focusdeck", version)]
#[command(about = "Recurring tasks and focus blocks, reconciled", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Tenant to act as (overrides config)
    #[arg(long, global = true)]
    tenant: Option<String>,
    /// User to act as (overrides config)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks and recurring templates
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage focus blocks
    Block {
        #[command(subcommand)]
        command: BlockCommands,
    },
    /// Create dated occurrences of recurring templates
    Materialize {
        /// Template id or prefix (default: every template)
        #[arg(short, long)]
        template: Option<String>,
        /// First day, YYYY-MM-DD (default: today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD (default: from + materialize_days)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show what matters today
    Today {
        /// Only tasks in this context
        #[arg(short, long)]
        context: Option<Context>,
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Fill missing fields in a store written by an older version
    Migrate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Longer description
    #[arg(long)]
    description: Option<String>,
    /// low, medium, high or urgent
    #[arg(short, long)]
    priority: Option<Priority>,
    /// Planned day, YYYY-MM-DD
    #[arg(long = "do")]
    do_date: Option<NaiveDate>,
    /// Deadline, YYYY-MM-DD
    #[arg(short, long)]
    due: Option<NaiveDate>,
    /// Day you commit to doing it, YYYY-MM-DD
    #[arg(long)]
    commit: Option<NaiveDate>,
    /// Expected duration in minutes
    #[arg(short, long)]
    minutes: Option<u32>,
    /// Recurrence (daily, weekly, monthly, yearly or an RRULE)
    #[arg(short, long)]
    recur: Option<String>,
}

impl TaskArgs {
    fn into_fields(self, context: Option<Context>) -> TaskFields {
        TaskFields {
            description: self.description,
            context,
            priority: self.priority,
            do_date: self.do_date,
            due_date: self.due,
            committed_date: self.commit,
            duration_minutes: self.minutes,
            recur: self.recur,
        }
    }
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a new task
    Add {
        /// Task name (quoted if it has spaces)
        name: String,
        /// house, work, personal, deep-focus, family, health or admin
        #[arg(short, long)]
        context: Context,
        #[command(flatten)]
        fields: TaskArgs,
    },
    /// List tasks sorted by urgency
    List {
        /// Show completed tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Print a task as JSON
    Show { id: String },
    /// Edit a task
    Edit {
        id: String,
        /// New task name
        #[arg(short, long)]
        name: Option<String>,
        /// New context
        #[arg(short, long)]
        context: Option<Context>,
        #[command(flatten)]
        fields: TaskArgs,
    },
    /// Mark a task as complete
    Complete { id: String },
    /// Remove a task
    Remove { id: String },
}

#[derive(Subcommand)]
enum BlockCommands {
    /// Add a focus block
    Add {
        title: String,
        /// Start, YYYY-MM-DDTHH:MM (local) or RFC 3339
        #[arg(short, long, value_parser = parse_timestamp)]
        start: DateTime<Utc>,
        /// End, YYYY-MM-DDTHH:MM (local) or RFC 3339
        #[arg(short, long, value_parser = parse_timestamp)]
        end: DateTime<Utc>,
        /// Context (required unless --task is given)
        #[arg(short, long)]
        context: Option<Context>,
        /// Schedule this task (id or prefix) into the block
        #[arg(short, long)]
        task: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Repeat the block (daily, weekly, ... or an RRULE)
        #[arg(short, long)]
        recur: Option<String>,
    },
    /// List focus blocks
    List {
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_timestamp)]
        to: Option<DateTime<Utc>>,
        /// One row per occurrence of repeating blocks
        #[arg(short = 'x', long)]
        expand: bool,
    },
    /// Move, resize or retitle a block
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        context: Option<Context>,
        #[arg(short, long, value_parser = parse_timestamp)]
        start: Option<DateTime<Utc>>,
        #[arg(short, long, value_parser = parse_timestamp)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        color: Option<String>,
        #[arg(short, long)]
        recur: Option<String>,
        /// Link the block to this task
        #[arg(short, long)]
        task: Option<String>,
        /// Remove the block's task link
        #[arg(long)]
        unlink: bool,
    },
    /// Remove a block and unschedule its task
    Remove { id: String },
}

fn main() {
    // Quiet by default; RUST_LOG=focusdeck=debug shows store and sync traffic.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("focusdeck=warn")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> focusdeck::Result<()> {
    let Cli { config, tenant, user, command } = cli;

    if let Commands::Completions { shell } = command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "focusdeck", &mut io::stdout());
        return Ok(());
    }

    let config_path = config.unwrap_or_else(Config::default_config_path);
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(t) = tenant {
        config.identity.tenant_id = t;
    }
    if let Some(u) = user {
        config.identity.user_id = u;
    }
    let data_file = config.data_file();
    tracing::debug!(config = %config_path.display(), data = %data_file.display(), "configuration loaded");

    if let Commands::Migrate = command {
        cmd_migrate(&data_file, false)?;
        return Ok(());
    }

    let scope = config.scope();
    let mut s = Session::new(JsonStore::open(data_file), scope, config, SystemClock);

    match command {
        Commands::Task { command } => match command {
            TaskCommands::Add { name, context, fields } => cmd_task_add(&mut s, name, context, fields.into_fields(None)).map(drop),
            TaskCommands::List { all } => cmd_task_list(&s, all).map(drop),
            TaskCommands::Show { id } => cmd_task_show(&s, &id).map(drop),
            TaskCommands::Edit { id, name, context, fields } => {
                cmd_task_edit(&mut s, &id, name, fields.into_fields(context)).map(drop)
            }
            TaskCommands::Complete { id } => cmd_task_complete(&mut s, &id).map(drop),
            TaskCommands::Remove { id } => cmd_task_remove(&mut s, &id).map(drop),
        },
        Commands::Block { command } => match command {
            BlockCommands::Add { title, start, end, context, task, color, recur } => {
                cmd_block_add(&mut s, title, context, start, end, task, color, recur).map(drop)
            }
            BlockCommands::List { from, to, expand } => cmd_block_list(&s, from, to, expand).map(drop),
            BlockCommands::Edit { id, title, context, start, end, color, recur, task, unlink } => {
                let fields = BlockFields { title, context, start, end, color, recur, task, unlink };
                cmd_block_edit(&mut s, &id, fields).map(drop)
            }
            BlockCommands::Remove { id } => cmd_block_remove(&mut s, &id).map(drop),
        },
        Commands::Materialize { template, from, to } => cmd_materialize(&mut s, template, from, to).map(drop),
        Commands::Today { context, json } => cmd_today(&s, context, json).map(drop),
        Commands::Migrate | Commands::Completions { .. } => Ok(()),
    }
}
