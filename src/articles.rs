// ABOUTME: Article catalog endpoints: CRUD, multipart creation with image upload, and asset downloads
// ABOUTME: Listed and fetched articles have their file references rewritten into absolute URLs

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{Request, StatusCode},
    response::{Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::entities::article;
use crate::error::{AppError, Result};
use crate::extract::{parse_id, ApiJson, RequestOrigin};
use crate::types::{normalize_price, ArticleChanges, ArticleView, NewArticle, UpdateArticleRequest};
use crate::AppState;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_articles)
                .post(create_article)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/:id",
            get(get_article).patch(update_article).delete(delete_article),
        )
        .route("/image/:image_url", get(serve_image))
        .route("/glb/:glb_url", get(serve_glb))
}

pub async fn list_articles(
    State(state): State<AppState>,
    origin: RequestOrigin,
) -> Result<Json<Vec<ArticleView>>> {
    let articles = state.storage.list_articles().await?;

    Ok(Json(
        articles
            .into_iter()
            .map(|article| ArticleView::new(article, &origin))
            .collect(),
    ))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    origin: RequestOrigin,
) -> Result<Json<ArticleView>> {
    // Only plain integers are ids; "1.0" or " 1" answer 404 like any unknown id.
    let article = match id.parse::<i32>() {
        Ok(id) => state.storage.find_article(id).await?,
        Err(_) => None,
    }
    .ok_or_else(|| AppError::NotFound("Article not found".to_string()))?;

    Ok(Json(ArticleView::new(article, &origin)))
}

#[derive(Debug, Default)]
struct ArticleForm {
    title: Option<String>,
    description: Option<String>,
    price: Option<String>,
    image_url: Option<String>,
    glb_url: Option<String>,
    upload: Option<(Option<String>, Bytes)>,
}

impl ArticleForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "image" && field.file_name().is_some() {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.upload = Some((file_name, bytes));
                }
                continue;
            }

            let value = non_empty(field.text().await?);
            match name.as_str() {
                "title" => form.title = value,
                "description" => form.description = value,
                "price" => form.price = value,
                "imageUrl" => form.image_url = value,
                "glbUrl" => form.glb_url = value,
                other => tracing::debug!("ignoring form field {other}"),
            }
        }

        Ok(form)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub async fn create_article(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<article::Model>)> {
    let form = ArticleForm::read(multipart).await?;

    let (Some(title), Some(price)) = (form.title, form.price) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };
    let price = price
        .parse::<f64>()
        .map_err(|_| AppError::BadRequest("Price must be a number".to_string()))
        .and_then(normalize_price)?;

    let image_url = match form.upload {
        Some((file_name, bytes)) => Some(
            state
                .assets
                .save_upload(file_name.as_deref(), &bytes)
                .await?,
        ),
        None => form.image_url,
    };

    let created = state
        .storage
        .create_article(NewArticle {
            title,
            description: form.description,
            price,
            image_url,
            glb_url: form.glb_url,
        })
        .await?;

    tracing::info!(article_id = created.id, "created article");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateArticleRequest>,
) -> Result<Json<article::Model>> {
    let id = parse_id(&id, "article")?;
    let changes = ArticleChanges::try_from(req)?;

    let updated = state
        .storage
        .update_article(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Article not found".to_string()))?;

    Ok(Json(updated))
}

pub async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = parse_id(&id, "article")?;

    if !state.storage.delete_article(id).await? {
        return Err(AppError::NotFound("Article not found".to_string()));
    }

    tracing::info!(article_id = id, "deleted article");
    Ok(Json(json!({ "success": true })))
}

pub async fn serve_image(
    State(state): State<AppState>,
    Path(image_url): Path<String>,
    request: Request<Body>,
) -> Result<Response> {
    state.assets.serve(&image_url, "Image", request).await
}

pub async fn serve_glb(
    State(state): State<AppState>,
    Path(glb_url): Path<String>,
    request: Request<Body>,
) -> Result<Response> {
    state.assets.serve(&glb_url, "GLB", request).await
}
