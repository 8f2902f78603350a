// ABOUTME: Type definitions for API requests, responses, and the article URL rewriting view
// ABOUTME: Request bodies are parsed into these structs and validated before any database work

use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::{article, order, order_item};
use crate::error::{AppError, Result};
use crate::extract::RequestOrigin;

// Article types

/// Article as returned to clients, with file references turned into download links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub price: i32,
    pub image_url: Option<String>,
    pub glb_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ArticleView {
    pub fn new(model: article::Model, origin: &RequestOrigin) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            price: model.price,
            image_url: model
                .image_url
                .as_deref()
                .map(|file| origin.asset_url(AssetKind::Image, file)),
            glb_url: model
                .glb_url
                .as_deref()
                .map(|file| origin.asset_url(AssetKind::Glb, file)),
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Glb,
}

impl AssetKind {
    pub fn route_segment(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Glb => "glb",
        }
    }
}

/// Fields accepted when creating an article, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub description: Option<String>,
    pub price: i32,
    pub image_url: Option<String>,
    pub glb_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub glb_url: Option<Option<String>>,
}

/// Validated partial update; `Some(None)` clears a nullable column.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<i32>,
    pub image_url: Option<Option<String>>,
    pub glb_url: Option<Option<String>>,
}

impl TryFrom<UpdateArticleRequest> for ArticleChanges {
    type Error = AppError;

    fn try_from(req: UpdateArticleRequest) -> Result<Self> {
        if matches!(&req.title, Some(title) if title.trim().is_empty()) {
            return Err(AppError::BadRequest("Title must not be empty".to_string()));
        }

        Ok(Self {
            title: req.title,
            description: req.description,
            price: req.price.map(normalize_price).transpose()?,
            image_url: req.image_url,
            glb_url: req.glb_url,
        })
    }
}

// Distinguishes an explicit `null` from an absent key.
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Rounds a submitted price to whole minor units.
pub fn normalize_price(price: f64) -> Result<i32> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest(
            "Price must be a non-negative number".to_string(),
        ));
    }

    let rounded = price.round();
    if rounded > f64::from(i32::MAX) {
        return Err(AppError::BadRequest("Price is too large".to_string()));
    }

    Ok(rounded as i32)
}

// Order types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub article_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Option<Vec<OrderLine>>,
}

#[derive(Debug, Deserialize)]
pub struct PatchOrderRequest {
    pub items: Option<Vec<OrderLine>>,
    pub status: Option<String>,
}

/// Rejects lines that could never be fulfilled.
pub fn validate_lines(lines: &[OrderLine]) -> Result<()> {
    if let Some(line) = lines.iter().find(|line| line.quantity < 1) {
        return Err(AppError::BadRequest(format!(
            "Quantity for article {} must be at least 1",
            line.article_id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems<I> {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<I>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemWithArticle {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub article: Option<ArticleView>,
}

/// Line echoed back from order creation, before ids and timestamps exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedItem {
    pub order_id: i32,
    pub article_id: i32,
    pub quantity: i32,
}

// Payment types

#[derive(Debug, Deserialize)]
pub struct PaymentSheetRequest {
    pub amount: f64,
    pub currency: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSheetResponse {
    pub payment_intent: String,
    pub ephemeral_key: String,
    pub customer: String,
    pub publishable_key: String,
}

/// Converts a major-unit amount into minor units.
pub fn to_minor_units(amount: f64) -> Result<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::BadRequest(
            "Amount must be a positive number".to_string(),
        ));
    }

    let minor = (amount * 100.0).round();
    if minor > i64::MAX as f64 {
        return Err(AppError::BadRequest("Amount is too large".to_string()));
    }

    Ok(minor as i64)
}

// Identity provisioning types

#[derive(Debug, Deserialize)]
pub struct ClerkEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<ClerkUserData>,
}

#[derive(Debug, Deserialize)]
pub struct ClerkUserData {
    pub id: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,
    pub primary_email_address_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClerkEmailAddress {
    pub id: Option<String>,
    pub email_address: Option<String>,
}

impl ClerkUserData {
    /// The address flagged as primary, or the first one listed.
    pub fn primary_email(&self) -> Option<&str> {
        let flagged = self.primary_email_address_id.as_deref().and_then(|primary| {
            self.email_addresses
                .iter()
                .find(|address| address.id.as_deref() == Some(primary))
        });

        flagged
            .or_else(|| self.email_addresses.first())
            .and_then(|address| address.email_address.as_deref())
            .filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub created: bool,
}

// Import types

#[derive(Debug, Deserialize)]
pub struct ImportedProduct {
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub glb: Option<String>,
}

impl TryFrom<ImportedProduct> for NewArticle {
    type Error = AppError;

    fn try_from(product: ImportedProduct) -> Result<Self> {
        Ok(Self {
            price: normalize_price(product.price)?,
            title: product.title,
            description: product.description,
            image_url: product.image.filter(|image| !image.is_empty()),
            glb_url: product.glb.filter(|glb| !glb.is_empty()),
        })
    }
}
