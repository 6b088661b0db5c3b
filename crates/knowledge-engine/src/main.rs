use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use examgraph_core::config::Config;
use examgraph_core::exam::{ExamRequest, DEFAULT_QUESTION_COUNT};
use examgraph_core::mcp_stdio::{run_mcp_stdio, ToolServer};
use examgraph_core::{export, integrity, NodeKind};
use regex::RegexBuilder;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "examgraph", version, about = "Exam preparation knowledge graph")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List nodes of one kind
    List {
        kind: NodeKind,
        /// Only questions whose topic matches this pattern (case-insensitive)
        #[arg(long)]
        topic: Option<String>,
    },
    /// Print one node in its persisted shape
    Show { id: String },
    /// Delete a node nobody references
    Delete { id: String },
    /// Rename a node and rewrite every reference to it
    Rename { old_id: String, new_id: String },
    /// Report broken references; exits non-zero if any are found
    Check,
    /// Report unknown fields and unconvertible records in the data files
    Audit,
    /// Build an exam PDF and its answer key
    Exam {
        /// Explicit question IDs, in order
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        /// Sample from questions whose topic contains this text
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value_t = DEFAULT_QUESTION_COUNT)]
        count: usize,
        /// Output file stem
        #[arg(long, default_value = "generated_exam")]
        name: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Render a PNG preview of one node
    Preview { id: String },
    /// Serve the store as JSON-RPC tools over stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout belongs to command output and the stdio server
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "examgraph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.config;
    let data = config.data();

    if let Command::Audit = cli.command {
        let audits = data.audit()?;
        println!(
            "Schema audit of {} ({})",
            data.root().display(),
            chrono::Local::now().format("%Y-%m-%d %H:%M")
        );
        for audit in &audits {
            let id = audit.id.as_deref().unwrap_or("<no id>");
            if !audit.unknown_fields.is_empty() {
                println!("{} {id}: unknown fields {}", audit.kind, audit.unknown_fields.join(", "));
            }
            if let Some(error) = &audit.error {
                println!("{} {id}: {error}", audit.kind);
            }
        }
        println!("{} records flagged", audits.len());
        return Ok(ExitCode::SUCCESS);
    }

    // skipped records are logged by the loader
    let (mut store, _) = data.load()?;

    match cli.command {
        Command::List { kind, topic } => {
            let pattern = topic
                .map(|t| RegexBuilder::new(&t).case_insensitive(true).build())
                .transpose()
                .context("Invalid --topic pattern")?;
            let mut nodes: Vec<_> = store.all_of_type(kind).collect();
            nodes.sort_by(|a, b| a.id().cmp(b.id()));
            for node in nodes {
                if let (Some(pattern), Some(q)) = (&pattern, node.as_question()) {
                    if !pattern.is_match(&q.topic) {
                        continue;
                    }
                }
                println!("{}\t{}", node.id(), node.label());
            }
        }
        Command::Show { id } => {
            let node = store.require(&id)?;
            let record = export::record(node)?;
            println!("# {}", node.kind());
            print!("{}", serde_yaml::to_string(&record)?);
            let referrers = integrity::referrers(&store, &id);
            if !referrers.is_empty() {
                println!("# referenced by:");
                for r in referrers {
                    println!("#   {} ({})", r.node_id, r.field);
                }
            }
        }
        Command::Delete { id } => {
            let removed = store.delete(&id)?;
            data.save(&store)?;
            println!("Deleted {} '{id}'", removed.kind());
        }
        Command::Rename { old_id, new_id } => {
            let rewritten = store.rename_id(&old_id, &new_id)?;
            data.save(&store)?;
            println!("Renamed '{old_id}' to '{new_id}' ({rewritten} references updated)");
        }
        Command::Check => {
            let broken = integrity::audit(&store);
            if broken.is_empty() {
                println!("No broken references found.");
                return Ok(ExitCode::SUCCESS);
            }
            for b in &broken {
                println!("{b}");
            }
            return Ok(ExitCode::FAILURE);
        }
        Command::Exam { ids, topic, count, name, title } => {
            let request = if ids.is_empty() {
                ExamRequest::sample(topic, count)
            } else {
                ExamRequest::ids(ids)
            };
            let selected = request.select(&store, &mut rand::rng());
            if selected.is_empty() {
                bail!("No questions matched the exam request");
            }
            let title = title.unwrap_or_else(|| request.title());
            let question_ids: Vec<&str> = selected.iter().map(|q| q.id.as_str()).collect();
            let (exam, key) = config.renderer().exam(&name, &title, &question_ids).await?;
            println!("Exam ready: {}", exam.display());
            println!("Answer key: {}", key.display());
        }
        Command::Preview { id } => {
            let node = store.require(&id)?;
            let png = config.renderer().preview(node).await?;
            println!("{}", png.display());
        }
        Command::Serve => {
            info!(nodes = store.len(), "starting stdio tool server");
            run_mcp_stdio(ToolServer::new(store, Some(data))).await?;
        }
        // reported before loading
        Command::Audit => {}
    }

    Ok(ExitCode::SUCCESS)
}
