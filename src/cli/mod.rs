//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lexground",
    version,
    author = "neur0map",
    about = "Citation-grounded answers from your own legal documents",
    long_about = "Lexground answers questions strictly from a corpus of documents you provide. \
                  Every substantive claim carries a citation to the snippet it came from, and \
                  questions the material cannot support are refused."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lexground/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the configuration
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, rebuild or inspect the corpus index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Manage the files in the corpus directory
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },

    /// Ask a single question
    Ask {
        /// Question to ask
        question: String,

        /// Focus on a corpus file (repeatable)
        #[arg(short, long, value_name = "FILE")]
        focus: Vec<String>,

        /// Search only the focus files instead of prioritising them
        #[arg(long, requires = "focus")]
        only: bool,

        /// Attach an image (png, jpg, jpeg)
        #[arg(short, long, value_name = "PATH")]
        image: Option<PathBuf>,

        /// Add a file to the index for this run only (repeatable)
        #[arg(short, long, value_name = "PATH")]
        upload: Vec<PathBuf>,

        /// Print the turn as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation
    ///
    /// Lines starting with `remember:`, `memo:` or `role:` update memory;
    /// `show snippet [#n]` prints evidence from the last answer.
    Chat {
        /// Focus on a corpus file (repeatable)
        #[arg(short, long, value_name = "FILE")]
        focus: Vec<String>,

        /// Search only the focus files instead of prioritising them
        #[arg(long, requires = "focus")]
        only: bool,

        /// Add a file to the index for this session only (repeatable)
        #[arg(short, long, value_name = "PATH")]
        upload: Vec<PathBuf>,
    },

    /// Inspect stored permanent facts
    Facts {
        #[command(subcommand)]
        action: FactsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Build the index if none exists
    Build,

    /// Delete the persisted index and build it again
    Rebuild,

    /// Compare the persisted index with the corpus
    Status,
}

#[derive(Subcommand, Debug)]
pub enum CorpusAction {
    /// Copy files into the corpus (invalidates the index)
    Add {
        /// Files to add
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete a file from the corpus (invalidates the index)
    Remove {
        /// File name inside the corpus directory
        name: String,
    },

    /// List corpus files
    List,
}

#[derive(Subcommand, Debug)]
pub enum FactsAction {
    /// List facts stored with `remember:`
    List,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_with_focus() {
        let cli = Cli::try_parse_from([
            "lexground",
            "ask",
            "what is consideration?",
            "--focus",
            "contract.pdf",
            "--focus",
            "notes.txt",
            "--only",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                question,
                focus,
                only,
                image,
                ..
            } => {
                assert_eq!(question, "what is consideration?");
                assert_eq!(focus, vec!["contract.pdf", "notes.txt"]);
                assert!(only);
                assert!(image.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_only_requires_focus() {
        assert!(Cli::try_parse_from(["lexground", "ask", "q", "--only"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lexground", "index", "status", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Index {
                action: IndexAction::Status
            }
        ));
    }
}
