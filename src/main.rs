use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tidepool::Result;
use tidepool::commands::{build_index, load_data, run_query, serve, show_config, show_status};

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Ocean observation retrieval service with natural-language query routing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an ocean observation CSV into the PostGIS table
    Load {
        /// Path to the CSV file
        csv: PathBuf,
    },
    /// Rebuild the vector index from the observation table
    Index,
    /// Answer a single query and print the result as JSON
    Query {
        /// The natural-language question
        text: String,
        /// Dispatch mode: auto, sql, semantic, or combined
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Number of results to return
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Start the HTTP query service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Show pipeline status: table rows, index documents, provider health
    Status,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load { csv } => {
            load_data(&csv).await?;
        }
        Commands::Index => {
            build_index().await?;
        }
        Commands::Query { text, mode, k } => {
            run_query(&text, &mode, k).await?;
        }
        Commands::Serve { host, port } => {
            serve(&host, port).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Config => {
            show_config()?;
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
        let cli = Cli::try_parse_from(["tidepool", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn load_requires_csv_path() {
        let cli = Cli::try_parse_from(["tidepool", "load"]);
        assert!(cli.is_err());
        if let Err(e) = cli {
            assert_eq!(e.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn query_with_defaults() {
        let cli = Cli::try_parse_from(["tidepool", "query", "coldest observations"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query { text, mode, k } = parsed.command {
                assert_eq!(text, "coldest observations");
                assert_eq!(mode, "auto");
                assert_eq!(k, 5);
            }
        }
    }

    #[test]
    fn query_with_mode_and_k() {
        let cli = Cli::try_parse_from([
            "tidepool",
            "query",
            "temperature > 25",
            "--mode",
            "sql",
            "--k",
            "3",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query { mode, k, .. } = parsed.command {
                assert_eq!(mode, "sql");
                assert_eq!(k, 3);
            }
        }
    }

    #[test]
    fn serve_with_custom_port() {
        let cli = Cli::try_parse_from(["tidepool", "serve", "--port", "9000"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Serve { host, port } = parsed.command {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 9000);
            }
        }
    }

    #[test]
    fn unknown_subcommand_fails() {
        let cli = Cli::try_parse_from(["tidepool", "crawl"]);
        assert!(cli.is_err());
    }
}
