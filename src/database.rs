//! Catalog assembly and ownership.
//!
//! The [`Database`] owns the catalog and search engine for the process
//! lifetime. It is constructed explicitly during startup — never lazily on
//! first use — and handed by reference to whatever serves queries, so
//! initialization ordering is deterministic and testable.
//!
//! Assembly walks a fallback hierarchy, taking the first tier that yields a
//! usable catalog:
//!
//! 1. precomputed publisher bundle (also primes the cache),
//! 2. fresh local cache,
//! 3. live fetch through the source parsers and aggregator,
//! 4. stale local cache as last resort.
//!
//! The overarching policy is "prefer complete over fresh": when some
//! sources fail, a larger stale catalog beats a smaller partial live one.
//! Only exhaustion of every tier is an error.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::cache::{CacheManager, CachedCatalog};
use crate::config::Config;
use crate::embedder::{self, EmbeddingMatrix, QueryEmbedder};
use crate::models::{Catalog, SearchHit};
use crate::precomputed::{self, Precomputed};
use crate::search::SearchEngine;
use crate::sources::all_sources;

/// Timeout applied to every outbound fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client: bounded timeout, redirects followed.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("mcp-scout/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

pub struct Database {
    engine: SearchEngine,
    cache: CacheManager,
    client: reqwest::Client,
    config: Config,
}

impl Database {
    /// Assemble the catalog and build the search engine.
    ///
    /// Fails only when every tier of the hierarchy has failed; any other
    /// problem degrades (lexical search, no matrix) and is logged.
    pub async fn init(config: Config) -> Result<Self> {
        let client = http_client()?;
        let cache = CacheManager::from_env(config.cache.dir.as_deref());
        let ttl = Duration::from_secs(config.cache.ttl_secs);

        let (catalog, pre_matrix, pre_model) =
            assemble_catalog(&config, &client, &cache, ttl).await?;
        info!(entries = catalog.entry_count(), "catalog ready");

        let engine = build_engine(&config, &cache, catalog, pre_matrix, pre_model)?;
        info!(
            semantic = engine.is_semantic(),
            "search engine initialized"
        );

        Ok(Self {
            engine,
            cache,
            client,
            config,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        self.engine.catalog()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.engine.search(query, top_k)
    }

    /// Force a live aggregation cycle and replace the catalog and engine.
    ///
    /// The complete-over-fresh policy still applies, with the current
    /// in-memory catalog playing the stale role: a partial fetch never
    /// shrinks the index.
    pub async fn refresh(&mut self) -> Result<()> {
        let (raw, failures) = fetch_live(&self.client).await;
        if raw.is_empty() {
            bail!("refresh failed: no source yielded any entries");
        }

        let fresh = aggregate(raw);
        let current = self.engine.catalog().clone();
        let chosen = select_fresh_or_stale(fresh, Some(current), failures);

        if let Err(e) = self.cache.store_catalog(&chosen) {
            warn!(error = %e, "failed to persist refreshed catalog");
        }

        self.engine = build_engine(&self.config, &self.cache, chosen, None, None)?;
        info!(
            entries = self.engine.catalog().entry_count(),
            "catalog refreshed"
        );
        Ok(())
    }

    /// Status summary for the `scout info` command.
    pub fn info(&self) -> serde_json::Value {
        let ttl = Duration::from_secs(self.config.cache.ttl_secs);
        serde_json::json!({
            "total_entries": self.catalog().entry_count(),
            "schema_version": self.catalog().schema_version.to_string(),
            "retrieved_at": self.catalog().retrieved_at,
            "search_mode": if self.engine.is_semantic() { "semantic" } else { "lexical" },
            "cache": self.cache.info(ttl),
        })
    }
}

/// Fetch all sources, isolating failures: a failed source contributes zero
/// entries and bumps the failure count.
async fn fetch_live(client: &reqwest::Client) -> (Vec<crate::models::ServerEntry>, usize) {
    let sources = all_sources();
    let mut raw = Vec::new();
    let mut failures = 0usize;

    for source in &sources {
        match source.entries(client).await {
            Ok(mut entries) => raw.append(&mut entries),
            Err(e) => {
                warn!(source = source.name(), error = %e, "source failed for this cycle");
                failures += 1;
            }
        }
    }

    (raw, failures)
}

/// Complete-over-fresh selection: with any source failure, the stale catalog
/// wins when it has strictly more entries than the partial live result.
fn select_fresh_or_stale(
    fresh: Catalog,
    stale: Option<Catalog>,
    failures: usize,
) -> Catalog {
    if failures == 0 {
        return fresh;
    }
    match stale {
        Some(stale) if stale.entry_count() > fresh.entry_count() => {
            info!(
                stale = stale.entry_count(),
                fresh = fresh.entry_count(),
                "using stale catalog, more complete than partial live fetch"
            );
            stale
        }
        _ => fresh,
    }
}

async fn assemble_catalog(
    config: &Config,
    client: &reqwest::Client,
    cache: &CacheManager,
    ttl: Duration,
) -> Result<(Catalog, Option<EmbeddingMatrix>, Option<String>)> {
    // Tier 1: publisher bundle.
    if let Precomputed::Loaded {
        catalog,
        matrix,
        model,
    } = precomputed::load(&config.precomputed, client, cache).await
    {
        return Ok((catalog, matrix, Some(model)));
    }

    // Tiers 2 and 4 share one read; stale data is held back until the live
    // tier has had its chance.
    let stale = match cache.load_catalog(ttl) {
        CachedCatalog::Fresh(catalog) => {
            info!(entries = catalog.entry_count(), "using cached catalog");
            return Ok((catalog, None, None));
        }
        CachedCatalog::Stale(catalog) => Some(catalog),
        CachedCatalog::Miss => None,
    };

    // Tier 3: live aggregation.
    info!("downloading server listings from all sources");
    let (raw, failures) = fetch_live(client).await;

    if raw.is_empty() {
        if let Some(stale) = stale {
            warn!(
                entries = stale.entry_count(),
                "all sources failed, using stale cached catalog"
            );
            return Ok((stale, None, None));
        }
        bail!("failed to load server listings from every source and no cache is available");
    }

    let raw_count = raw.len();
    let fresh = aggregate(raw);
    info!(
        unique = fresh.entry_count(),
        raw = raw_count,
        failed_sources = failures,
        "aggregated live listings"
    );

    let chosen = select_fresh_or_stale(fresh, stale, failures);
    if let Err(e) = cache.store_catalog(&chosen) {
        warn!(error = %e, "failed to persist catalog cache");
    }
    Ok((chosen, None, None))
}

/// Obtain a matrix and embedder for the catalog and construct the engine,
/// degrading stepwise to a lexical-only engine.
fn build_engine(
    config: &Config,
    cache: &CacheManager,
    catalog: Catalog,
    pre_matrix: Option<EmbeddingMatrix>,
    pre_model: Option<String>,
) -> Result<SearchEngine> {
    let embedder = match embedder::load_embedder(&config.embedding.model, &cache.models_dir()) {
        Ok(e) => Some(e),
        Err(e) => {
            warn!(error = %e, "embedding model unavailable, using lexical search");
            None
        }
    };

    let matrix = resolve_matrix(
        config,
        cache,
        &catalog,
        pre_matrix,
        pre_model.as_deref(),
        embedder.as_deref(),
    );

    match SearchEngine::new(catalog.clone(), matrix, embedder, config.search.similarity_threshold)
    {
        Ok(engine) => Ok(engine),
        Err(e) => {
            warn!(error = %e, "semantic engine rejected, using lexical search");
            Ok(SearchEngine::lexical_only(catalog))
        }
    }
}

/// Matrix resolution order: aligned precomputed matrix, then hash-keyed
/// cache, then local computation (persisted for next time), then none.
fn resolve_matrix(
    config: &Config,
    cache: &CacheManager,
    catalog: &Catalog,
    pre_matrix: Option<EmbeddingMatrix>,
    pre_model: Option<&str>,
    embedder: Option<&dyn QueryEmbedder>,
) -> Option<EmbeddingMatrix> {
    if let Some(matrix) = pre_matrix {
        match embedder {
            Some(e) if !matrix.is_empty() && e.dims() != matrix.dims() => {
                warn!(
                    model_dims = e.dims(),
                    matrix_dims = matrix.dims(),
                    precomputed_model = pre_model.unwrap_or("unknown"),
                    "precomputed matrix does not match the local model, recomputing"
                );
            }
            _ => return Some(matrix),
        }
    }

    let model_name = embedder
        .map(|e| e.model_name().to_string())
        .unwrap_or_else(|| config.embedding.model.clone());
    let hash = catalog.content_hash(&model_name);

    if let Some(matrix) = cache.load_matrix(&hash) {
        if matrix.len() == catalog.entry_count() {
            return Some(matrix);
        }
        warn!(
            rows = matrix.len(),
            entries = catalog.entry_count(),
            "cached matrix misaligned with catalog, ignoring"
        );
    }

    let embedder = embedder?;
    info!(
        entries = catalog.entry_count(),
        model = model_name,
        "computing embeddings locally"
    );

    let texts: Vec<String> = catalog
        .entries
        .iter()
        .map(|e| e.embedding_text())
        .collect();

    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(config.embedding.batch_size.max(1)) {
        match embedder.embed_batch(chunk) {
            Ok(mut batch) => rows.append(&mut batch),
            Err(e) => {
                warn!(error = %e, "embedding computation failed, using lexical search");
                return None;
            }
        }
    }

    let matrix = match EmbeddingMatrix::from_rows(rows) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "model produced a ragged matrix, using lexical search");
            return None;
        }
    };

    if let Err(e) = cache.store_matrix(&hash, &matrix) {
        warn!(error = %e, "failed to persist embedding matrix");
    }
    debug!(rows = matrix.len(), dims = matrix.dims(), "embeddings computed");
    Some(matrix)
}
