use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatrelay", version, about = "Terminal chat client and LLM relay server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve,

    /// Enter the interactive chat REPL
    Chat {
        /// Session to open (full id or unique prefix); defaults to the current one
        #[arg(short, long)]
        session: Option<String>,

        /// Keep history in memory only for this run
        #[arg(long)]
        ephemeral: bool,
    },

    /// Manage stored chat sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show or change how new messages are sent
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Check that the relay is reachable
    Probe,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a new session and make it current
    New,

    /// List sessions grouped by date
    List,

    /// Make a session current
    Switch {
        id: String,
    },

    /// Delete a session
    Delete {
        id: String,
    },

    /// Rename a session
    Rename {
        id: String,
        title: String,
    },

    /// Export a session as plain text
    Export {
        id: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        path: Option<String>,
        /// Include per-message timestamps
        #[arg(long)]
        dated: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings
    Show,

    /// Update one or more settings
    Set {
        #[arg(long)]
        system_prompt: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
    },
}
