//! Publisher-side bundle builder (`scout build-data`).
//!
//! Runs the full pipeline — fetch every source, aggregate, embed — and
//! writes the three bundle files that `precomputed` consumes:
//! `catalog.json`, `embeddings.bin`, and `data_info.json`.
//!
//! Unlike the serving path, this path has no degradation: a build without
//! embeddings would publish a bundle that defeats its own purpose, so the
//! embedding model is required and any failure aborts the build.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::cache::CacheManager;
use crate::config::Config;
use crate::database::http_client;
use crate::embedder::{self, EmbeddingMatrix};
use crate::schema::CURRENT_SCHEMA_VERSION;
use crate::sources::all_sources;

pub async fn run_build_data(config: &Config, out_dir: &Path) -> Result<()> {
    let client = http_client()?;

    let sources = all_sources();
    let mut raw = Vec::new();
    let mut failures = 0usize;
    for source in &sources {
        match source.entries(&client).await {
            Ok(mut entries) => {
                info!(source = source.name(), entries = entries.len(), "fetched listing");
                raw.append(&mut entries);
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "source failed");
                failures += 1;
            }
        }
    }
    if raw.is_empty() {
        bail!("every source failed, nothing to build");
    }
    if failures > 0 {
        warn!(failures, "building from a partial source set");
    }

    let catalog = aggregate(raw);
    info!(entries = catalog.entry_count(), "aggregated catalog");

    let cache = CacheManager::from_env(config.cache.dir.as_deref());
    let embedder = embedder::load_embedder(&config.embedding.model, &cache.models_dir())
        .context("build-data requires the embedding model")?;

    let texts: Vec<String> = catalog
        .entries
        .iter()
        .map(|e| e.embedding_text())
        .collect();
    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(config.embedding.batch_size.max(1)) {
        let mut batch = embedder.embed_batch(chunk)?;
        rows.append(&mut batch);
    }
    let matrix = EmbeddingMatrix::from_rows(rows)?;
    info!(rows = matrix.len(), dims = matrix.dims(), "computed embeddings");

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let catalog_path = out_dir.join("catalog.json");
    let json = serde_json::to_vec_pretty(&catalog.entries)?;
    std::fs::write(&catalog_path, json)
        .with_context(|| format!("failed to write {}", catalog_path.display()))?;

    let matrix_path = out_dir.join("embeddings.bin");
    std::fs::write(&matrix_path, matrix.to_blob())
        .with_context(|| format!("failed to write {}", matrix_path.display()))?;

    let info = serde_json::json!({
        "schema_version": CURRENT_SCHEMA_VERSION.to_string(),
        "entry_count": catalog.entry_count(),
        "model": embedder.model_name(),
        "build_timestamp": chrono::Utc::now().to_rfc3339(),
    });
    let info_path = out_dir.join("data_info.json");
    std::fs::write(&info_path, serde_json::to_vec_pretty(&info)?)
        .with_context(|| format!("failed to write {}", info_path.display()))?;

    info!(dir = %out_dir.display(), "bundle written");
    Ok(())
}
