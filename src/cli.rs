use clap::{Parser, Subcommand};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "pcp-backend")]
#[command(about = "PCP change request backend (DuckDB + object storage + fax relay)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the provider roster CSV into DuckDB and create the submissions table.
    Seed(SeedArgs),
    /// Serve the HTTP API (requires a completed seed).
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SeedArgs {
    /// Backend data directory (DuckDB database and seed metadata).
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Provider roster CSV (provider_name,npi,insurance,location,priority).
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/data/providers.csv"))]
    pub providers_csv: String,

    /// Recreate tables even if they already exist.
    #[arg(long)]
    pub rebuild: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Backend data directory (DuckDB database).
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,

    /// Object storage bucket for filled PDFs.
    #[arg(long, default_value = "pcp-change-forms")]
    pub bucket: String,

    /// Object storage endpoint base (override for an emulator).
    #[arg(long, default_value = "https://storage.googleapis.com")]
    pub storage_endpoint: String,

    /// Fax backend URL; falls back to the FAX_API_URL environment variable.
    #[arg(long)]
    pub fax_api_url: Option<String>,
}
