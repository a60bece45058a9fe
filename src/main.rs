//! Content Signature Chain - operator console
//!
//! Builds a synthetic content-signature chain on start, exports the PEM bundle
//! and root fingerprint, and offers a menu for rebuilding the chain from a JSON
//! model and signing files with the current leaf key.
//!
//! ```bash
//! ./target/release/content-signature-chain [config.toml]
//! ```

use anyhow::{Context, Result};
use content_signature_chain::certificate_model::CertificateModel;
use content_signature_chain::chain_builder::Chain;
use content_signature_chain::chain_state::ChainStore;
use content_signature_chain::configs::{AppConfig, DEFAULT_CONFIG_PATH};
use content_signature_chain::protocol::{Protocol, Request, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, found) = AppConfig::load_or_default(&config_path)?;
    init_logging(&config.logging.level);
    if !found {
        info!(path = %config_path, "config file not found, using defaults");
    }

    println!("=== Content Signature Chain ===\n");
    let model = config.defaults.model()?;
    let store = Arc::new(ChainStore::new(&model).context("Failed to build initial chain")?);
    println!("✓ Chain generated");
    export_chain(&config, &store.current())?;

    let protocol = Protocol::new(Arc::clone(&store), config.content_signature.x5u.clone());

    // Main menu loop
    loop {
        println!("\n=== Content Signature Menu ===");
        println!("1. Regenerate chain from JSON model file");
        println!("2. Sign a file");
        println!("3. Show root fingerprint");
        println!("4. Exit");
        print!("\nSelect an option: ");
        io::stdout().flush()?;

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;

        match choice.trim() {
            "1" => regenerate_from_file(&protocol, &config)?,
            "2" => sign_file(&protocol)?,
            "3" => show_fingerprint(&protocol),
            "4" => {
                println!("\nExiting Content Signature Chain...");
                break;
            }
            _ => println!("Invalid option. Please select 1-4."),
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn export_chain(config: &AppConfig, chain: &Chain) -> Result<()> {
    std::fs::create_dir_all(&config.exports.directory).context(format!(
        "Failed to create export directory {}",
        config.exports.directory.display()
    ))?;

    let chain_path = config.exports.chain_path();
    std::fs::write(&chain_path, chain.pem_bundle())
        .context(format!("Failed to write {}", chain_path.display()))?;
    println!("✓ Certificate chain exported to '{}'", chain_path.display());

    let fingerprint_path = config.exports.fingerprint_path();
    std::fs::write(&fingerprint_path, format!("{}\n", chain.root_fingerprint()))
        .context(format!("Failed to write {}", fingerprint_path.display()))?;
    println!("✓ Root fingerprint exported to '{}'", fingerprint_path.display());
    Ok(())
}

fn regenerate_from_file(protocol: &Protocol, config: &AppConfig) -> Result<()> {
    println!("\n=== Regenerate Chain ===");
    let path = prompt("Model file")?;
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("✗ Could not read '{}': {}", path, e);
            return Ok(());
        }
    };
    let model = match CertificateModel::from_json(&bytes) {
        Ok(model) => model,
        Err(e) => {
            println!("✗ {}", e);
            return Ok(());
        }
    };

    match protocol.process_request(Request::Regenerate { model }) {
        Response::RegenerateResponse {
            generation,
            layout,
            root_fingerprint,
            ..
        } => {
            println!("✓ Chain regenerated (generation {})", generation);
            let roles: Vec<String> = layout.iter().map(|role| role.to_string()).collect();
            println!("  Layout: {}", roles.join(", "));
            println!("  Root fingerprint: {}", root_fingerprint);
            export_chain(config, &protocol.store().current())?;
        }
        Response::Error { message } => println!("✗ Regeneration failed, previous chain kept: {}", message),
        other => println!("✗ Unexpected response: {:?}", other),
    }
    Ok(())
}

fn sign_file(protocol: &Protocol) -> Result<()> {
    println!("\n=== Sign File ===");
    let path = prompt("File to sign")?;
    let payload = match std::fs::read(&path) {
        Ok(payload) => payload,
        Err(e) => {
            println!("✗ Could not read '{}': {}", path, e);
            return Ok(());
        }
    };

    match protocol.process_request(Request::Sign {
        payload: STANDARD.encode(&payload),
    }) {
        Response::SignResponse {
            message,
            content_signature,
            ..
        } => {
            println!("✓ {}", message);
            println!("Content-Signature: {}", content_signature);
        }
        Response::Error { message } => println!("✗ Signing failed: {}", message),
        other => println!("✗ Unexpected response: {:?}", other),
    }
    Ok(())
}

fn show_fingerprint(protocol: &Protocol) {
    if let Response::RootFingerprintResponse { root_fingerprint } =
        protocol.process_request(Request::RootFingerprint)
    {
        println!("\nRoot fingerprint: {}", root_fingerprint);
    }
}
