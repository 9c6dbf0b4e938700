use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tokenward", version, about = "Log in to an authentication service and make authenticated requests")]
pub struct Cli {
    /// Service base URL (overrides config and TOKENWARD_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Log in with an email address or username
    Login {
        /// Defaults to the last identifier used
        identifier: Option<String>,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Revoke the session and forget stored tokens
    Logout,
    /// Show the logged-in user's profile
    Whoami,
    /// Renew the access token now
    Refresh,
    /// Show whether tokens are stored (no network)
    Status,
    /// Call the service's protected demo route
    Protected,
    /// Send an authenticated request and print the response
    Request {
        /// Path relative to the service URL, e.g. /orders
        path: String,
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(long, short = 'd')]
        data: Option<String>,
    },
}
