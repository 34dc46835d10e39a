//! Homekeep CLI - operator interface for the household secret store.
//!
//! Configuration comes from the environment (`HOMEKEEP_SECRET_KEY`,
//! `HOMEKEEP_SESSION_SECRET`, `HOMEKEEP_DATABASE`). Commands acting on
//! behalf of a household member take a bearer session via
//! `--authorization` or `HOMEKEEP_AUTHORIZATION`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use homekeep_common::{RecordId, Role, SecretKind, SensitiveBytes, Subject, SubjectId};
use homekeep_crypto::{keys, SecretCipher};
use homekeep_disclosure::config::MAX_SESSION_TTL_SECS;
use homekeep_disclosure::{
    AppConfig, CipherUpgrade, DisclosureService, NewSecret, SystemTokenService,
};
use homekeep_store::{MetadataUpdate, SqliteStore, TokenName};

#[derive(Parser)]
#[command(name = "homekeep")]
#[command(about = "Homekeep - Household secret store")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Authorization value, e.g. "Bearer <token>".
    #[arg(short, long, global = true, env = "HOMEKEEP_AUTHORIZATION", hide_env_values = true)]
    authorization: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Credential,
    NetworkKey,
}

impl From<KindArg> for SecretKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Credential => SecretKind::Credential,
            KindArg::NetworkKey => SecretKind::NetworkKey,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Parent,
    Child,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Parent => Role::Parent,
            RoleArg::Child => Role::Child,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new process key.
    Keygen,

    /// Create the database and its tables.
    Init,

    /// Issue a session token for a household member.
    IssueToken {
        /// Subject identifier.
        #[arg(short, long)]
        subject: String,

        /// Household role.
        #[arg(short, long, value_enum)]
        role: RoleArg,

        /// Grant admin rights.
        #[arg(long)]
        admin: bool,

        /// Lifetime in seconds (default: configured session TTL).
        #[arg(long)]
        ttl_secs: Option<i64>,
    },

    /// List secrets (metadata only).
    List {
        /// Only list secrets of this kind.
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Store a new secret. The value is read from the terminal.
    Add {
        /// Secret kind.
        #[arg(short, long, value_enum, default_value = "credential")]
        kind: KindArg,

        /// Display title.
        #[arg(short, long)]
        title: String,

        /// Associated username.
        #[arg(short, long)]
        username: Option<String>,

        /// Associated URL or SSID.
        #[arg(long)]
        url: Option<String>,

        /// Let children reveal the value.
        #[arg(long)]
        visible_to_child: bool,
    },

    /// Print the decrypted value of a secret.
    Reveal {
        /// Secret id.
        #[arg(short, long)]
        id: i64,
    },

    /// Replace the value of a secret. The value is read from the terminal.
    Rotate {
        /// Secret id.
        #[arg(short, long)]
        id: i64,
    },

    /// Change the title, username, or URL of a secret.
    Edit {
        /// Secret id.
        #[arg(short, long)]
        id: i64,

        /// New title.
        #[arg(short, long)]
        title: Option<String>,

        /// New username.
        #[arg(short, long, conflicts_with = "clear_username")]
        username: Option<String>,

        /// Remove the username.
        #[arg(long)]
        clear_username: bool,

        /// New URL or SSID.
        #[arg(long, conflicts_with = "clear_url")]
        url: Option<String>,

        /// Remove the URL.
        #[arg(long)]
        clear_url: bool,
    },

    /// Allow children to reveal a secret.
    Share {
        /// Secret id.
        #[arg(short, long)]
        id: i64,

        /// Hide the secret from children again.
        #[arg(long)]
        revoke: bool,
    },

    /// Delete a secret.
    Remove {
        /// Secret id.
        #[arg(short, long)]
        id: i64,
    },

    /// Store or replace a system token. The value is read from the terminal.
    TokenSet {
        /// Token name.
        #[arg(short, long)]
        name: String,
    },

    /// Print the decrypted value of a system token.
    TokenReveal {
        /// Token name.
        #[arg(short, long)]
        name: String,
    },

    /// Delete a system token.
    TokenRemove {
        /// Token name.
        #[arg(short, long)]
        name: String,
    },

    /// List system token names.
    TokenList,

    /// Re-encrypt rows still stored under the legacy cipher.
    UpgradeCiphers {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so revealed values on stdout stay pipeable
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let auth = cli.authorization.as_deref();

    match cli.command {
        Commands::Keygen => cmd_keygen(),

        Commands::Init => cmd_init().await,

        Commands::IssueToken {
            subject,
            role,
            admin,
            ttl_secs,
        } => cmd_issue_token(&subject, role.into(), admin, ttl_secs),

        Commands::List { kind, json } => cmd_list(auth, kind.map(Into::into), json).await,

        Commands::Add {
            kind,
            title,
            username,
            url,
            visible_to_child,
        } => cmd_add(auth, kind.into(), title, username, url, visible_to_child).await,

        Commands::Reveal { id } => cmd_reveal(auth, RecordId::new(id)).await,

        Commands::Rotate { id } => cmd_rotate(auth, RecordId::new(id)).await,

        Commands::Edit {
            id,
            title,
            username,
            clear_username,
            url,
            clear_url,
        } => {
            let update = MetadataUpdate {
                title,
                username: if clear_username { Some(None) } else { username.map(Some) },
                url: if clear_url { Some(None) } else { url.map(Some) },
                visible_to_child: None,
            };
            cmd_edit(auth, RecordId::new(id), update).await
        }

        Commands::Share { id, revoke } => cmd_share(auth, RecordId::new(id), !revoke).await,

        Commands::Remove { id } => cmd_remove(auth, RecordId::new(id)).await,

        Commands::TokenSet { name } => cmd_token_set(auth, &name).await,

        Commands::TokenReveal { name } => cmd_token_reveal(auth, &name).await,

        Commands::TokenRemove { name } => cmd_token_remove(auth, &name).await,

        Commands::TokenList => cmd_token_list(auth).await,

        Commands::UpgradeCiphers { json } => cmd_upgrade_ciphers(json).await,
    }
}

/// Opened configuration, store, and cipher shared by the commands.
struct Runtime {
    config: AppConfig,
    store: Arc<SqliteStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl Runtime {
    fn load() -> Result<Self> {
        let config = AppConfig::from_env().context("Failed to load configuration")?;
        let store = config
            .open_store()
            .with_context(|| format!("Failed to open {}", config.database().display()))?;
        let cipher = Arc::new(config.cipher_engine());

        Ok(Self {
            config,
            store: Arc::new(store),
            cipher,
        })
    }

    /// Resolve the caller from the authorization value.
    fn caller(&self, authorization: Option<&str>) -> Result<Subject> {
        let authorization = authorization
            .context("This command needs --authorization or HOMEKEEP_AUTHORIZATION")?;
        let identity = self
            .config
            .identity_context()
            .context("Sessions are not configured")?;
        identity
            .resolve(authorization)
            .context("Authorization rejected")
    }

    fn secrets(&self) -> DisclosureService {
        DisclosureService::new(self.store.clone(), Arc::clone(&self.cipher))
    }

    fn tokens(&self) -> SystemTokenService {
        SystemTokenService::new(self.store.clone(), Arc::clone(&self.cipher))
    }
}

/// Prompt for a secret value securely.
fn prompt_secret(prompt: &str) -> Result<SensitiveBytes> {
    let value = Zeroizing::new(rpassword::prompt_password(prompt).context("Failed to read value")?);
    if value.is_empty() {
        anyhow::bail!("Value cannot be empty");
    }
    Ok(SensitiveBytes::from(value.as_str()))
}

/// Prompt twice and require both entries to match.
fn prompt_new_secret() -> Result<SensitiveBytes> {
    let value = prompt_secret("Enter value: ")?;
    let confirm = prompt_secret("Confirm value: ")?;

    if value.as_bytes() != confirm.as_bytes() {
        anyhow::bail!("Values do not match");
    }
    Ok(value)
}

fn token_name(name: &str) -> Result<TokenName> {
    TokenName::new(name).context("Invalid token name")
}

/// Print a fresh process key.
fn cmd_keygen() -> Result<()> {
    let key = keys::generate_hex();
    println!("{}", key.as_str());
    eprintln!("Store this as HOMEKEEP_SECRET_KEY. It cannot be recovered if lost.");
    Ok(())
}

/// Create the database.
async fn cmd_init() -> Result<()> {
    let runtime = Runtime::load()?;
    info!("Database ready at {}", runtime.config.database().display());

    println!("Database initialized: {}", runtime.config.database().display());
    Ok(())
}

/// Validate a `--ttl-secs` value.
fn session_lifetime(secs: i64) -> Result<chrono::Duration> {
    (1..=MAX_SESSION_TTL_SECS)
        .contains(&secs)
        .then(|| chrono::Duration::try_seconds(secs))
        .flatten()
        .with_context(|| format!("--ttl-secs must be between 1 and {}", MAX_SESSION_TTL_SECS))
}

/// Issue a session token.
fn cmd_issue_token(subject: &str, role: Role, admin: bool, ttl_secs: Option<i64>) -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let signer = config.session_signer()?;
    let ttl = match ttl_secs {
        Some(secs) => session_lifetime(secs)?,
        None => config.session_ttl(),
    };

    let subject = Subject::new(
        SubjectId::new(subject).context("Invalid subject")?,
        role,
        admin,
    );
    let token = signer
        .issue(&subject, ttl)
        .context("Failed to issue token")?;

    info!("Issued session for {} ({})", subject.id(), subject.role());
    println!("Bearer {}", token);
    Ok(())
}

/// List secrets.
async fn cmd_list(auth: Option<&str>, kind: Option<SecretKind>, json: bool) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    let views = runtime
        .secrets()
        .list(&caller, kind)
        .await
        .context("Failed to list secrets")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        println!("No secrets stored.");
    } else {
        for view in views {
            let meta = &view.metadata;
            let lock = if view.revealable { " " } else { "*" };
            println!(
                "{}{:>5}  {:<12} {:<30} {}",
                lock,
                meta.id.get(),
                meta.kind.as_str(),
                meta.title,
                meta.username.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

/// Store a new secret.
async fn cmd_add(
    auth: Option<&str>,
    kind: SecretKind,
    title: String,
    username: Option<String>,
    url: Option<String>,
    visible_to_child: bool,
) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;
    let value = prompt_new_secret()?;

    let mut secret = NewSecret::new(kind, title, value).visible_to_child(visible_to_child);
    secret.username = username;
    secret.url = url;

    let id = runtime
        .secrets()
        .store(&caller, secret)
        .await
        .context("Failed to store secret")?;

    println!("Secret stored with id {}", id);
    Ok(())
}

/// Reveal a secret.
async fn cmd_reveal(auth: Option<&str>, id: RecordId) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    let value = runtime
        .secrets()
        .reveal(&caller, id)
        .await
        .context("Failed to reveal secret")?;

    println!("{}", value.as_utf8()?);
    Ok(())
}

/// Rotate a secret.
async fn cmd_rotate(auth: Option<&str>, id: RecordId) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;
    let value = prompt_new_secret()?;

    runtime
        .secrets()
        .rotate(&caller, id, value)
        .await
        .context("Failed to rotate secret")?;

    println!("Secret {} rotated", id);
    Ok(())
}

/// Edit secret metadata.
async fn cmd_edit(auth: Option<&str>, id: RecordId, update: MetadataUpdate) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    let meta = runtime
        .secrets()
        .update_metadata(&caller, id, update)
        .await
        .context("Failed to update secret")?;

    println!("Secret {} updated: {}", meta.id, meta.title);
    Ok(())
}

/// Change child visibility.
async fn cmd_share(auth: Option<&str>, id: RecordId, visible: bool) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    runtime
        .secrets()
        .set_visible_to_child(&caller, id, visible)
        .await
        .context("Failed to change visibility")?;

    if visible {
        println!("Secret {} is now visible to children", id);
    } else {
        println!("Secret {} is now hidden from children", id);
    }
    Ok(())
}

/// Delete a secret.
async fn cmd_remove(auth: Option<&str>, id: RecordId) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    runtime
        .secrets()
        .delete(&caller, id)
        .await
        .context("Failed to remove secret")?;

    println!("Secret {} removed", id);
    Ok(())
}

/// Store a system token.
async fn cmd_token_set(auth: Option<&str>, name: &str) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;
    let name = token_name(name)?;
    let value = prompt_new_secret()?;

    runtime
        .tokens()
        .put(&caller, &name, value)
        .await
        .context("Failed to store system token")?;

    println!("System token stored: {}", name);
    Ok(())
}

/// Reveal a system token.
async fn cmd_token_reveal(auth: Option<&str>, name: &str) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;
    let name = token_name(name)?;

    let value = runtime
        .tokens()
        .reveal(&caller, &name)
        .await
        .context("Failed to reveal system token")?;

    println!("{}", value.as_utf8()?);
    Ok(())
}

/// Delete a system token.
async fn cmd_token_remove(auth: Option<&str>, name: &str) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;
    let name = token_name(name)?;

    runtime
        .tokens()
        .delete(&caller, &name)
        .await
        .context("Failed to remove system token")?;

    println!("System token removed: {}", name);
    Ok(())
}

/// List system tokens.
async fn cmd_token_list(auth: Option<&str>) -> Result<()> {
    let runtime = Runtime::load()?;
    let caller = runtime.caller(auth)?;

    let tokens = runtime
        .tokens()
        .list(&caller)
        .await
        .context("Failed to list system tokens")?;

    if tokens.is_empty() {
        println!("No system tokens stored.");
    } else {
        for token in tokens {
            println!(
                "  {:<40} updated {}",
                token.name.as_str(),
                token.updated_at.to_rfc3339()
            );
        }
    }
    Ok(())
}

/// Re-encrypt legacy rows.
async fn cmd_upgrade_ciphers(json: bool) -> Result<()> {
    let runtime = Runtime::load()?;
    info!("Upgrading legacy ciphertexts in {}", runtime.config.database().display());

    let upgrade = CipherUpgrade::new(
        runtime.store.clone(),
        runtime.store.clone(),
        Arc::clone(&runtime.cipher),
    );
    let report = upgrade.run().await.context("Cipher upgrade failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Cipher upgrade complete:");
        println!("  Secrets upgraded: {}", report.records_upgraded);
        println!("  Tokens upgraded: {}", report.tokens_upgraded);
        println!("  Skipped: {}", report.skipped);
        println!("  Failed: {}", report.failed);
    }

    if report.failed > 0 {
        anyhow::bail!("{} rows could not be decrypted", report.failed);
    }
    Ok(())
}
