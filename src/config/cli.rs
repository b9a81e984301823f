use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the entity-relay binary.
#[derive(Debug, Parser)]
#[command(
    name = "entity-relay",
    version,
    about = "Cached, deduplicated access to remote CMS entities"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ENTITY_RELAY_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Load one entity, from cache when a valid copy exists.
    Get(GetArgs),
    /// Run a list query against an entity type.
    Index(IndexArgs),
    /// Create or update an entity from a JSON document.
    Save(SaveArgs),
    /// Delete an entity remotely.
    Delete(DeleteArgs),
    /// Drop cached copies without contacting the remote.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Toggle the entity cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache TTL; 0 keeps entries until invalidated.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the cache backend (memory|file).
    #[arg(long = "cache-backend", value_name = "BACKEND", global = true)]
    pub cache_backend: Option<String>,

    /// Override the file cache directory.
    #[arg(long = "cache-directory", value_name = "PATH", global = true)]
    pub cache_directory: Option<PathBuf>,

    /// Override the remote site URL.
    #[arg(long = "remote-base-url", value_name = "URL", global = true)]
    pub remote_base_url: Option<String>,

    /// Override the remote endpoint path.
    #[arg(long = "remote-endpoint", value_name = "PATH", global = true)]
    pub remote_endpoint: Option<String>,

    /// Override the remote request timeout.
    #[arg(long = "remote-timeout-seconds", value_name = "SECONDS", global = true)]
    pub remote_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Entity type, e.g. `node` or `user`.
    pub entity_type: String,

    /// Entity id.
    pub id: String,

    /// Discard any cached copy before loading.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub reset: bool,
}

#[derive(Debug, Args, Clone)]
pub struct IndexArgs {
    /// Entity type, e.g. `node` or `user`.
    pub entity_type: String,

    /// Query path relative to the endpoint; defaults to `{type}.json`.
    #[arg(long = "query", value_name = "PATH")]
    pub query: Option<String>,

    /// Discard any cached result before querying.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub reset: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SaveArgs {
    /// Entity type, e.g. `node` or `user`.
    pub entity_type: String,

    /// JSON document holding the entity fields; `-` reads stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Bundle for node entities, e.g. `article`.
    #[arg(long, default_value = "")]
    pub bundle: String,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    /// Entity type, e.g. `node` or `user`.
    pub entity_type: String,

    /// Entity id.
    pub id: String,

    /// Also drop the cached copy once the remote delete succeeds.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub invalidate: bool,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Entity type, e.g. `node` or `user`.
    #[arg(required_unless_present = "index")]
    pub entity_type: Option<String>,

    /// Entity id.
    #[arg(required_unless_present = "index")]
    pub id: Option<i64>,

    /// Drop a cached index result instead of an entity.
    #[arg(long = "index", value_name = "QUERY", conflicts_with_all = ["entity_type", "id"])]
    pub index: Option<String>,
}
