pub mod init;
pub mod migrate;
pub mod serve;
pub mod series;
pub mod user;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "academy")]
#[command(version)]
#[command(about = "Online courses: series, modules, content and enrollment", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "academy.toml", env = "ACADEMY_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file and data directories
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Apply pending database migrations
    Migrate,
    /// Run the HTTP server
    Serve {
        /// Overrides `server.host`
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Overrides `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Series {
        #[command(subcommand)]
        command: SeriesCommand,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        name: String,
        /// student or instructor
        #[arg(long = "type", default_value = "student")]
        user_type: String,
        /// Staff account with access to management and the admin area
        #[arg(long)]
        superuser: bool,
        #[arg(long)]
        password: Option<String>,
    },
    List {
        /// Only list students or instructors
        #[arg(long = "type")]
        user_type: Option<String>,
    },
    Remove {
        email: String,
    },
    Passwd {
        email: String,
    },
}

#[derive(Subcommand)]
pub enum SeriesCommand {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: Option<String>,
    },
    List,
    Remove {
        slug: String,
    },
}
