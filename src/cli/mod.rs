//! CLI module - Command-line interface for Townhall
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

use crate::domain::AccountState;

/// Townhall - community accounts server
#[derive(Parser)]
#[command(name = "townhall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Inspect and administer accounts
    #[command(alias = "u")]
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List accounts
    #[command(alias = "ls")]
    List {
        /// Only show accounts in this state
        #[arg(long, value_parser = parse_state)]
        state: Option<AccountState>,
    },

    /// Suspend an active or pending account
    Suspend {
        permalink: String,
        /// Admin recorded as the actor
        #[arg(long = "as", default_value = "admin")]
        actor: String,
    },

    /// Lift a suspension
    Unsuspend {
        permalink: String,
        #[arg(long = "as", default_value = "admin")]
        actor: String,
    },

    /// Soft delete an account
    #[command(alias = "rm")]
    Delete {
        permalink: String,
        #[arg(long = "as", default_value = "admin")]
        actor: String,
    },

    /// Remove an account and its moderatorships for good
    Purge {
        permalink: String,
        #[arg(long = "as", default_value = "admin")]
        actor: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Give an account the global admin role
    GrantAdmin { permalink: String },
}

fn parse_state(value: &str) -> Result<AccountState, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

pub use commands::*;
