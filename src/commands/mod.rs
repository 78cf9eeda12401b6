mod ask;
mod history;
mod ingest;
mod sources;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest documents into the context store
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },
    /// List ingested documents
    Sources {
        #[arg(long)]
        project: Option<String>,
    },
    /// Ask a question against a project's documents
    Ask {
        question: String,
        #[arg(long)]
        project: Option<String>,
        /// Attach a document (document id or item id); repeatable
        #[arg(long = "select", value_name = "DOC")]
        selected: Vec<String>,
        /// Force a mode: general_research, suitability_scoring, spec_writer, policy_compliance
        #[arg(long)]
        action: Option<String>,
        /// Where the question was asked from, e.g. project or worksheet
        #[arg(long)]
        view: Option<String>,
        #[arg(long, default_value = "default")]
        thread: String,
    },
    /// Print a thread's stored messages
    History {
        #[arg(long, default_value = "default")]
        thread: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum IngestTarget {
    /// A local file: text, HTML, PDF or spreadsheet
    File {
        path: PathBuf,
        /// Project the document belongs to (omit for the global knowledge base)
        #[arg(long)]
        project: Option<String>,
        /// Source type: upload, worksheet, report, project, policy_manual, global_kb
        #[arg(long, default_value = "upload")]
        source: String,
    },
    /// A web page, fetched and converted to text
    Url {
        url: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Species profiles from a JSON file (one record or an array)
    Species {
        #[arg(long)]
        input: PathBuf,
    },
    /// Web search documents from a JSON file (one payload or an array)
    Web {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        project: Option<String>,
    },
}

pub async fn run(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Ingest { target } => match target {
            IngestTarget::File {
                path,
                project,
                source,
            } => ingest::ingest_file(state, &path, project.as_deref(), &source).await,
            IngestTarget::Url { url, project } => {
                ingest::ingest_url(state, &url, project.as_deref()).await
            }
            IngestTarget::Species { input } => ingest::ingest_species(state, &input).await,
            IngestTarget::Web { input, project } => {
                ingest::ingest_web(state, &input, project.as_deref()).await
            }
        },
        Command::Sources { project } => sources::sources(state, project.as_deref()).await,
        Command::Ask {
            question,
            project,
            selected,
            action,
            view,
            thread,
        } => {
            ask::ask(
                state,
                ask::AskArgs {
                    question,
                    project,
                    selected,
                    action,
                    view,
                    thread,
                },
            )
            .await
        }
        Command::History { thread, limit } => history::history(state, &thread, limit).await,
    }
}
