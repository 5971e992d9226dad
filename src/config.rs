use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "loyalty-pass-server")]
#[command(about = "Merchant stamp cards with signed wallet passes")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://loyalty.db?mode=rwc")]
    pub database_url: String,

    /// Minimum time between two stamps on one card, in milliseconds
    #[arg(long, env = "STAMP_COOLDOWN_MS", default_value = "60000")]
    pub stamp_cooldown_ms: u64,

    /// Stamps per reward when the merchant template does not set one
    #[arg(long, env = "DEFAULT_STAMPS_PER_REWARD", default_value = "10")]
    pub default_stamps_per_reward: u32,

    /// Pass type identifier registered with the wallet vendor
    #[arg(long, env = "PASS_TYPE_IDENTIFIER")]
    pub pass_type_identifier: String,

    /// Team identifier of the signing certificate
    #[arg(long, env = "PASS_TEAM_IDENTIFIER")]
    pub team_identifier: String,

    /// Organization name shown on passes
    #[arg(long, env = "PASS_ORGANIZATION_NAME")]
    pub organization_name: String,

    /// PEM private key used to sign pass manifests
    #[arg(long, env = "PASS_SIGNING_KEY")]
    pub signing_key: PathBuf,

    /// PEM signer certificate
    #[arg(long, env = "PASS_SIGNING_CERT")]
    pub signing_cert: PathBuf,

    /// PEM trust-chain certificate
    #[arg(long, env = "PASS_SIGNING_CHAIN")]
    pub signing_chain: PathBuf,

    /// Passphrase of the signing key, if it is encrypted
    #[arg(long, env = "PASS_SIGNING_KEY_PASSPHRASE", hide_env_values = true)]
    pub signing_key_passphrase: Option<String>,

    /// Directory holding pass images (must contain icon.png)
    #[arg(long, env = "PASS_ASSETS_DIR", default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Root for per-request scratch directories (system temp dir if unset)
    #[arg(long, env = "SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// openssl binary used for manifest signatures
    #[arg(long, env = "OPENSSL_BIN", default_value = "openssl")]
    pub openssl_bin: PathBuf,

    /// zip binary used for pass archives
    #[arg(long, env = "ZIP_BIN", default_value = "zip")]
    pub zip_bin: PathBuf,

    /// Timeout for external tools, in milliseconds
    #[arg(long, env = "TOOL_TIMEOUT_MS", default_value = "15000")]
    pub tool_timeout_ms: u64,

    /// Wallet issuer id, prefix of every class and object id
    #[arg(long, env = "WALLET_ISSUER_ID")]
    pub wallet_issuer_id: String,

    /// Issuer name shown on wallet classes
    #[arg(long, env = "WALLET_ISSUER_NAME", default_value = "Loyalty")]
    pub wallet_issuer_name: String,

    /// Prefix of wallet class ids, followed by the merchant id
    #[arg(long, env = "WALLET_CLASS_PREFIX", default_value = "loyalty")]
    pub wallet_class_prefix: String,

    /// Wallet objects API base URL
    #[arg(
        long,
        env = "WALLET_BASE_URL",
        default_value = "https://walletobjects.googleapis.com/walletobjects/v1"
    )]
    pub wallet_base_url: String,

    /// Bearer token for the wallet objects API
    #[arg(long, env = "WALLET_ACCESS_TOKEN", hide_env_values = true)]
    pub wallet_access_token: String,

    /// Public URL of the program logo shown on wallet classes
    #[arg(long, env = "WALLET_PROGRAM_LOGO_URL")]
    pub wallet_program_logo_url: Option<String>,

    /// Patch existing wallet classes instead of leaving them untouched
    #[arg(long, env = "WALLET_FORCE_PATCH_CLASS")]
    pub wallet_force_patch_class: bool,

    /// Campaign notifications allowed per wallet object in 24 hours
    #[arg(long, env = "NOTIFICATION_QUOTA", default_value = "3")]
    pub notification_quota: u32,

    /// Window in which a repeated dedupe key is suppressed, in seconds
    #[arg(long, env = "NOTIFICATION_DEDUPE_SECS", default_value = "86400")]
    pub notification_dedupe_secs: i64,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stamp_cooldown(&self) -> Duration {
        Duration::from_millis(self.stamp_cooldown_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn notification_dedupe_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.notification_dedupe_secs)
    }
}
