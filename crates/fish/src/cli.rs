//! §6.5 — the CLI surface (an external collaborator we still implement
//! because `serve`/`init` are the only way to drive the rest of this
//! crate end to end). Exit codes follow §6.5: `0` on success, non-zero
//! (via `anyhow`'s `main` unwind) on fatal startup error.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::RngCore;

#[derive(Parser, Debug)]
#[command(name = "fish", author, version, about = "Node-local control plane for a fleet of ephemeral compute environments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the node: store, identity, elector, drivers, gates, API.
    Serve {
        #[arg(long)]
        config: Option<String>,
    },
    /// Bootstrap a fresh data directory: self-signed CA, node certificate
    /// and key, a starter `fish.toml`, and an admin role (§6.5).
    Init {
        #[arg(long, default_value = "fish_data")]
        path: String,
    },
    /// Print the binary's version and exit.
    Version,
}

/// Bootstraps a fresh node directory: CA + node cert/key (§1 "TLS/CA
/// bootstrap ... consumed as opaque primitives" — we still have to
/// produce them once, the way `krustlet`'s bootstrapping module does with
/// `rcgen`), a starter config file, and an admin `Role` record seeded
/// directly into the store so `init` leaves behind a usable node.
pub fn run_init(path: &str) -> Result<()> {
    let dir = Path::new(path);
    std::fs::create_dir_all(dir).with_context(|| format!("creating {path}"))?;

    let ca_cert_path = dir.join("ca.crt");
    let node_cert_path = dir.join("node.crt");
    let node_key_path = dir.join("node.key");
    let config_path = dir.join("fish.toml");
    let db_path = dir.join("db");

    if node_cert_path.exists() {
        anyhow::bail!("{} already initialized ({} exists)", path, node_cert_path.display());
    }

    let ca = rcgen::generate_simple_self_signed(vec!["fish-ca".to_string()])
        .context("failed to generate CA certificate")?;
    std::fs::write(&ca_cert_path, ca.cert.pem()).context("writing ca.crt")?;

    let node = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .context("failed to generate node certificate")?;
    std::fs::write(&node_cert_path, node.cert.pem()).context("writing node.crt")?;
    std::fs::write(&node_key_path, node.key_pair.serialize_pem()).context("writing node.key")?;

    let config_toml = format!(
        "[core]\n\
         api_address = \"0.0.0.0:8443\"\n\
         node_name = \"fish-node\"\n\
         node_location = \"\"\n\
         node_address = \"127.0.0.1:8443\"\n\
         cert_path = \"{cert}\"\n\
         key_path = \"{key}\"\n\
         ca_path = \"{ca}\"\n\
         db_path = \"{db}\"\n\
         ping_interval = 10\n\
         election_window = 5\n\
         allocation_retry_cap = 3\n",
        cert = node_cert_path.display(),
        key = node_key_path.display(),
        ca = ca_cert_path.display(),
        db = db_path.display(),
    );
    std::fs::write(&config_path, config_toml).context("writing fish.toml")?;

    seed_admin_role(&db_path).context("seeding admin role")?;

    println!("initialized fish node directory at {path}");
    println!("  config: {}", config_path.display());
    println!("  ca:     {}", ca_cert_path.display());
    println!("  cert:   {}", node_cert_path.display());
    println!("  key:    {}", node_key_path.display());
    Ok(())
}

/// Seeds a single `admin` role with unrestricted permissions so a freshly
/// initialized node has something for the transport collaborator's
/// `UserService` to attach a first account to. RBAC enforcement itself is
/// out of the core's hard path (§3).
fn seed_admin_role(db_path: &Path) -> Result<()> {
    use crate::model::{ObjectKind, Permission, Role};
    use crate::store::{Collection, Store};
    use crate::uid::Uid;

    let store = Store::open(db_path).context("opening store")?;
    let roles: Collection<Role> = Collection::new(&store, ObjectKind::Role);

    let mut prefix = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut prefix);

    let admin = Role {
        uid: Uid::new(&prefix),
        name: "admin".to_string(),
        permissions: vec![Permission {
            resource: "*".to_string(),
            action: "*".to_string(),
        }],
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    roles.add("admin", &admin)?;
    Ok(())
}
