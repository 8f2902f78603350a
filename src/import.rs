// ABOUTME: Bulk import of catalog articles from a JSON product file
// ABOUTME: Prices are rounded to whole minor units and all rows are written in one transaction

use anyhow::Context;

use crate::config::ImportConfig;
use crate::error::{AppError, Result};
use crate::storage::Storage;
use crate::types::{ImportedProduct, NewArticle};

pub async fn run(config: ImportConfig) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&config.file)
        .await
        .with_context(|| format!("reading {}", config.file.display()))?;

    let storage = Storage::connect(&config.database.database_url).await?;
    let count = import_products(&storage, &raw).await?;

    tracing::info!("Imported {count} articles from {}", config.file.display());
    Ok(())
}

pub async fn import_products(storage: &Storage, raw_json: &str) -> Result<usize> {
    let products: Vec<ImportedProduct> = serde_json::from_str(raw_json)
        .map_err(|e| AppError::BadRequest(format!("invalid product file: {e}")))?;

    let articles = products
        .into_iter()
        .map(NewArticle::try_from)
        .collect::<Result<Vec<_>>>()?;

    storage.import_articles(articles).await
}
