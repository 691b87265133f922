//! `feedplan catalog` and `feedplan templates`: load curated content and
//! motivation messages from JSON files.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sqlx::PgPool;

use feedplan_db::models::CatalogItem;
use feedplan_db::queries::catalog as catalog_db;
use feedplan_db::queries::templates::{self as templates_db, NewMessageTemplate};

use crate::{CatalogCommands, TemplateCommands};

pub async fn run_catalog_command(command: CatalogCommands, pool: &PgPool) -> Result<()> {
    match command {
        CatalogCommands::Import { file } => {
            let items = read_catalog_file(&file)?;
            for item in &items {
                catalog_db::upsert_item(pool, item).await?;
            }
            println!("Imported {} catalog item(s) from {}.", items.len(), file.display());
        }
        CatalogCommands::Prune => {
            let removed = catalog_db::delete_expired(pool).await?;
            println!("Removed {removed} expired catalog item(s).");
        }
    }
    Ok(())
}

pub async fn run_template_command(command: TemplateCommands, pool: &PgPool) -> Result<()> {
    match command {
        TemplateCommands::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read template file: {}", file.display()))?;
            let templates = parse_templates(&contents)
                .with_context(|| format!("invalid template file: {}", file.display()))?;
            for t in &templates {
                templates_db::upsert_template(pool, &t.as_new()).await?;
            }
            println!("Imported {} template(s) from {}.", templates.len(), file.display());
        }
    }
    Ok(())
}

/// Read and validate a catalog file.
pub fn read_catalog_file(path: &Path) -> Result<Vec<CatalogItem>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;
    parse_catalog(&contents).with_context(|| format!("invalid catalog file: {}", path.display()))
}

/// Parse a JSON array of catalog items.
pub fn parse_catalog(contents: &str) -> Result<Vec<CatalogItem>> {
    let items: Vec<CatalogItem> =
        serde_json::from_str(contents).context("expected a JSON array of catalog items")?;

    for (i, item) in items.iter().enumerate() {
        if item.source_id.trim().is_empty() {
            bail!("item {i}: source_id is empty");
        }
        if item.creator_id.trim().is_empty() {
            bail!("item {i} ({}): creator_id is empty", item.source_id);
        }
        if !(0.0..=1.0).contains(&item.quality_score) {
            bail!(
                "item {i} ({}): quality_score {} is outside 0..=1",
                item.source_id,
                item.quality_score
            );
        }
    }
    Ok(items)
}

/// One template as written in an import file.
#[derive(Debug, Deserialize)]
pub struct TemplateEntry {
    pub template_key: String,
    pub category: String,
    pub message_en: String,
    #[serde(default)]
    pub message_ru: Option<String>,
    #[serde(default)]
    pub message_es: Option<String>,
    #[serde(default = "empty_conditions")]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

fn empty_conditions() -> serde_json::Value {
    serde_json::json!({})
}

impl TemplateEntry {
    fn as_new(&self) -> NewMessageTemplate<'_> {
        NewMessageTemplate {
            template_key: &self.template_key,
            category: &self.category,
            message_en: &self.message_en,
            message_ru: self.message_ru.as_deref(),
            message_es: self.message_es.as_deref(),
            conditions: self.conditions.clone(),
            emoji: self.emoji.as_deref(),
            priority: self.priority,
        }
    }
}

/// Parse a JSON array of templates. Conditions must be an object of
/// integers.
pub fn parse_templates(contents: &str) -> Result<Vec<TemplateEntry>> {
    let templates: Vec<TemplateEntry> =
        serde_json::from_str(contents).context("expected a JSON array of templates")?;

    for t in &templates {
        if t.message_en.trim().is_empty() {
            bail!("template {}: message_en is empty", t.template_key);
        }
        let Some(conditions) = t.conditions.as_object() else {
            bail!("template {}: conditions must be an object", t.template_key);
        };
        if let Some((key, _)) = conditions.iter().find(|(_, v)| v.as_i64().is_none()) {
            bail!("template {}: condition {key} is not an integer", t.template_key);
        }
    }
    Ok(templates)
}
