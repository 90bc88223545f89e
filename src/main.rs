use clap::{Parser, Subcommand};
use docrag::Result;
use docrag::commands::{
    delete_document, ingest_file, list_documents, query_knowledge, select_document, show_config,
    update_document, update_preferences,
};
use docrag::config::{Config, get_config_dir};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Document knowledge retrieval: ingest documents and augment chat queries")]
#[command(version)]
struct Cli {
    /// User the command acts for
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a plain-text document and embed its chunks
    Ingest {
        /// Path to a .txt or .md file
        file: PathBuf,
        /// Title for the document (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Optional author
        #[arg(long)]
        author: Option<String>,
        /// Immediately select the document for retrieval
        #[arg(long)]
        select: bool,
    },
    /// List ingested documents
    List,
    /// Select a document for retrieval
    Select {
        /// Document ID
        document: String,
        /// Deselect instead of select
        #[arg(long)]
        off: bool,
    },
    /// Update a document's title or author
    Update {
        /// Document ID
        document: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
    },
    /// Delete a document (soft delete unless --purge)
    Delete {
        /// Document ID
        document: String,
        /// Remove the rows entirely, cascading to chunks and embeddings
        #[arg(long)]
        purge: bool,
    },
    /// Show or change retrieval preferences
    Prefs {
        /// Chat model whose context window bounds the knowledge budget
        #[arg(long)]
        model: Option<String>,
        /// Enable or disable knowledge-query mode
        #[arg(long)]
        knowledge: Option<bool>,
        /// Percentage of the context window allocated to retrieved knowledge
        #[arg(long)]
        percent: Option<i64>,
    },
    /// Augment a query with knowledge context and print the result
    Query {
        /// The user query
        text: String,
    },
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(get_config_dir().map_err(anyhow::Error::from)?)?;

    match cli.command {
        Commands::Ingest {
            file,
            title,
            author,
            select,
        } => {
            ingest_file(&config, &cli.user, &file, title, author, select).await?;
        }
        Commands::List => {
            list_documents(&config, &cli.user).await?;
        }
        Commands::Select { document, off } => {
            select_document(&config, &document, !off).await?;
        }
        Commands::Update {
            document,
            title,
            author,
        } => {
            update_document(&config, &document, title, author).await?;
        }
        Commands::Delete { document, purge } => {
            delete_document(&config, &document, purge).await?;
        }
        Commands::Prefs {
            model,
            knowledge,
            percent,
        } => {
            update_preferences(&config, &cli.user, model, knowledge, percent).await?;
        }
        Commands::Query { text } => {
            query_knowledge(&config, &cli.user, &text).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docrag", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::List);
            assert_eq!(parsed.user, "local");
        }
    }

    #[test]
    fn ingest_command_with_options() {
        let cli = Cli::try_parse_from([
            "docrag",
            "ingest",
            "notes.txt",
            "--title",
            "My Notes",
            "--select",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                file,
                title,
                select,
                ..
            } = parsed.command
            {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(title, Some("My Notes".to_string()));
                assert!(select);
            }
        }
    }

    #[test]
    fn query_command_with_user() {
        let cli = Cli::try_parse_from(["docrag", "--user", "alice", "query", "what is rust?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.user, "alice");
            if let Commands::Query { text } = parsed.command {
                assert_eq!(text, "what is rust?");
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docrag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docrag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
