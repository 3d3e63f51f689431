//! Command-line arguments and their environment fallbacks.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = ".secondary_contacts";
const DEFAULT_DB_FILE: &str = "contacts.sqlite3";

/// Local contact book backed by SQLite.
///
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "contacts_cli", version, about)]
pub struct Cli {
    /// Database file [env: CONTACTS_DB_PATH] [default: ~/.secondary_contacts/contacts.sqlite3]
    #[arg(long, short = 'd', global = true)]
    pub db: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error) [env: CONTACTS_LOG_LEVEL]
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset [env: CONTACTS_LOG_DIR]
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print core linkage info.
    Ping,
    /// List contacts by name, optionally filtered by text and group.
    List {
        #[arg(long, short = 'q', default_value = "")]
        query: String,
        #[arg(long, short = 'g')]
        group: Option<String>,
    },
    /// Name or phone substring search.
    Search { query: String },
    /// Favorite contacts.
    Favorites,
    /// Contacts in one group.
    Group { group: String },
    /// Most recently called contacts.
    Recent {
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: u32,
    },
    /// Dial-pad suggestions for typed digits.
    Dial { digits: String },
    /// Add a contact.
    Add {
        name: String,
        phone: String,
        #[arg(long, short = 'g', default_value = "")]
        group: String,
        #[arg(long)]
        favorite: bool,
    },
    /// Set the favorite flag.
    Favorite {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Record a call to a contact now.
    Called { id: i64 },
    /// Delete a contact.
    Delete { id: i64 },
    /// Import contacts from a .csv or .vcf file.
    Import { file: PathBuf },
    /// Export all contacts to a .csv or .vcf file.
    Export { file: PathBuf },
}

pub struct Config {
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_cli_and_env(cli: &Cli) -> Self {
        let db_path = cli
            .db
            .clone()
            .or_else(|| non_empty_env(contacts_core::config::DB_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|home| PathBuf::from(home).join(DEFAULT_DATA_DIR))
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
                    .join(DEFAULT_DB_FILE)
            });

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| non_empty_env("CONTACTS_LOG_LEVEL"))
            .unwrap_or_else(|| contacts_core::default_log_level().to_string());

        let log_dir = cli
            .log_dir
            .clone()
            .or_else(|| non_empty_env("CONTACTS_LOG_DIR").map(PathBuf::from));

        Self {
            db_path,
            log_level,
            log_dir,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, Config};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn parses_add_with_group_and_global_db() {
        let cli = Cli::parse_from([
            "contacts_cli", "add", "Ada", "555", "--group", "Work", "--db", "/tmp/c.sqlite3",
        ]);
        assert_eq!(
            cli.command,
            Command::Add {
                name: "Ada".to_string(),
                phone: "555".to_string(),
                group: "Work".to_string(),
                favorite: false,
            }
        );
        let config = Config::from_cli_and_env(&cli);
        assert_eq!(config.db_path, PathBuf::from("/tmp/c.sqlite3"));
    }

    #[test]
    fn parses_favorite_flag_value() {
        let cli = Cli::parse_from(["contacts_cli", "favorite", "3", "false"]);
        assert_eq!(cli.command, Command::Favorite { id: 3, value: false });
    }

    #[test]
    fn recent_limit_defaults_to_ten() {
        let cli = Cli::parse_from(["contacts_cli", "recent"]);
        assert_eq!(cli.command, Command::Recent { limit: 10 });
    }
}
