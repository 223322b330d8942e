//! Command handler modules for the `kds` CLI.
//!
//! Shared setup (config -> engine) and the small one-shot commands live here.
//! Order commands live in [`orders`].

pub mod orders;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use kds_client::StaticToken;
use kds_config::SyncConfig;
use kds_runtime::Engine;
use tracing::info;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config, resolve the token (optional), and wire the engine.
pub fn build_engine(config_paths: &[String]) -> Result<Engine> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = kds_config::load_layered_yaml(&path_refs)?;
    let cfg = SyncConfig::from_config_json(&loaded.config_json).context("invalid sync config")?;

    let token = kds_config::resolve_token(&loaded.config_json, false)?;
    info!(
        config_hash = %loaded.config_hash,
        base_url = %cfg.base_url,
        token_present = token.is_some(),
        "engine configured"
    );
    let credentials = match token {
        Some(t) => StaticToken::new(t.expose()),
        None => StaticToken::none(),
    };
    Ok(Engine::build(&cfg, Arc::new(credentials)))
}

// ---------------------------------------------------------------------------
// departments / notes
// ---------------------------------------------------------------------------

pub async fn departments(engine: &Engine) -> Result<()> {
    let list = kds_orders::list_departments(&engine.client, None)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    if !list.ok {
        anyhow::bail!(
            "department lookup failed: {}",
            list.error.as_deref().unwrap_or("unknown error")
        );
    }
    for d in &list.departments {
        println!("department={} code={}", d.name, d.code);
    }
    println!("departments={}", list.departments.len());
    Ok(())
}

pub async fn notes(engine: &Engine, codes: &[String]) -> Result<()> {
    let found = engine
        .notes
        .notes_for(codes, None)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    for (code, note) in &found {
        println!("item={} note={:?}", code, note);
    }
    Ok(())
}
