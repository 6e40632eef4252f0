//! CLI argument parsing using clap derive

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use forum_server::config::DEFAULT_CONFIG_FILE;

/// Forum extension manager - install, toggle, and configure forum extensions
#[derive(Parser, Debug)]
#[command(name = "forum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the server configuration file
    #[arg(short, long, global = true, env = "FORUM_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP admin server
    Serve {
        /// Address to bind, overriding the configuration file
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// List installed extensions
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Install an extension from a zip archive or directory
    ///
    /// The extension is installed disabled.
    ///
    /// Examples:
    ///   forum install cookie-consent.zip
    ///   forum install ./my-theme --user alice
    Install {
        /// Zip archive or unpacked extension directory
        archive: PathBuf,

        /// User recorded as the installer
        #[arg(short, long, default_value = "admin")]
        user: String,
    },

    /// Remove an extension and its index entry
    Uninstall {
        /// Extension id
        id: String,
    },

    /// Enable an extension (themes replace the active theme)
    Enable {
        /// Extension id
        id: String,
    },

    /// Disable an extension
    Disable {
        /// Extension id
        id: String,
    },

    /// Disable then re-enable an extension
    Reload {
        /// Extension id
        id: String,
    },

    /// Make a theme the active theme
    Activate {
        /// Theme id
        id: String,
    },

    /// Read or change an extension's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print a freshly generated admin token
    Token,
}

/// Configuration actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the stored configuration record
    Get {
        /// Extension id
        id: String,
    },

    /// Merge KEY=VALUE pairs into the user configuration
    ///
    /// Values are parsed as JSON when possible: `limit=10`, `visible=true`,
    /// `label="Accept all"`.
    Set {
        /// Extension id
        id: String,

        /// KEY=VALUE assignments
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Restore the schema defaults
    Reset {
        /// Extension id
        id: String,
    },
}
