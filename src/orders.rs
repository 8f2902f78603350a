// ABOUTME: Order endpoints: payment sheets, order placement, and order listings joined with items and articles
// ABOUTME: Caller-scoped routes map the Clerk identity to a local user before touching orders

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::collections::HashMap;

use crate::entities::{order, order_item, user};
use crate::error::{AppError, Result};
use crate::extract::{parse_id, ApiJson, CallerIdentity, RequestOrigin};
use crate::payments::PaymentSheetParams;
use crate::types::{
    to_minor_units, validate_lines, ArticleView, CreateOrderRequest, ItemWithArticle,
    OrderWithItems, PatchOrderRequest, PaymentSheetRequest, PaymentSheetResponse, SubmittedItem,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_own_orders).post(create_order))
        .route("/payment-sheet", post(create_payment_sheet))
        .route("/all", get(list_all_orders))
        .route("/:id", get(get_order).patch(patch_order))
}

pub async fn create_payment_sheet(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PaymentSheetRequest>,
) -> Result<Json<PaymentSheetResponse>> {
    let amount_minor = to_minor_units(req.amount)?;

    let currency = req.currency.trim().to_ascii_lowercase();
    if currency.is_empty() {
        return Err(AppError::BadRequest("Currency is required".to_string()));
    }

    let email = req.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    let sheet = state
        .payments
        .create_payment_sheet(&PaymentSheetParams {
            email: email.to_string(),
            amount_minor,
            currency,
        })
        .await?;

    Ok(Json(sheet))
}

async fn resolve_user(state: &AppState, caller: &CallerIdentity) -> Result<user::Model> {
    state
        .storage
        .find_user_by_external_id(&caller.0)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn list_own_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
    origin: RequestOrigin,
) -> Result<Json<Vec<OrderWithItems<ItemWithArticle>>>> {
    let user = resolve_user(&state, &caller).await?;

    let orders = state.storage.orders_for_user(user.id).await?;
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items = state.storage.items_for_orders(&order_ids).await?;
    let items = attach_articles(&state, items, &origin).await?;

    Ok(Json(nest_items(orders, items, |item| item.item.order_id)))
}

pub async fn list_all_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderWithItems<order_item::Model>>>> {
    let orders = state.storage.all_orders().await?;
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items = state.storage.items_for_orders(&order_ids).await?;

    Ok(Json(nest_items(orders, items, |item| item.order_id)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    origin: RequestOrigin,
) -> Result<Json<OrderWithItems<ItemWithArticle>>> {
    let id = parse_id(&id, "order")?;

    let order = state
        .storage
        .find_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let items = state.storage.items_for_orders(&[order.id]).await?;
    let items = attach_articles(&state, items, &origin).await?;

    Ok(Json(OrderWithItems { order, items }))
}

pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems<SubmittedItem>>)> {
    let user = resolve_user(&state, &caller).await?;

    let lines = match req.items {
        Some(items) if !items.is_empty() => items,
        _ => return Err(AppError::BadRequest("Missing or invalid items".to_string())),
    };
    validate_lines(&lines)?;

    let order = state.storage.place_order(user.id, &lines).await?;

    let items = lines
        .iter()
        .map(|line| SubmittedItem {
            order_id: order.id,
            article_id: line.article_id,
            quantity: line.quantity,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(OrderWithItems { order, items })))
}

pub async fn patch_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PatchOrderRequest>,
) -> Result<Json<OrderWithItems<order_item::Model>>> {
    let id = parse_id(&id, "order")?;

    if let Some(lines) = &req.items {
        validate_lines(lines)?;
    }
    let status = match req.status {
        Some(status) if status.trim().is_empty() => {
            return Err(AppError::BadRequest("Status must not be empty".to_string()))
        }
        status => status.map(|s| s.trim().to_string()),
    };

    let order = state
        .storage
        .update_order(id, req.items.as_deref(), status)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let items = state.storage.items_for_orders(&[order.id]).await?;
    Ok(Json(OrderWithItems { order, items }))
}

/// Loads every referenced article in one query and pairs it with its item.
async fn attach_articles(
    state: &AppState,
    items: Vec<order_item::Model>,
    origin: &RequestOrigin,
) -> Result<Vec<ItemWithArticle>> {
    let article_ids: Vec<i32> = items.iter().map(|item| item.article_id).collect();
    let articles = state.storage.articles_by_ids(&article_ids).await?;

    Ok(items
        .into_iter()
        .map(|item| {
            let article = articles
                .get(&item.article_id)
                .cloned()
                .map(|article| ArticleView::new(article, origin));
            ItemWithArticle { item, article }
        })
        .collect())
}

/// Groups items under their parent order, keeping both input orders.
pub fn nest_items<I>(
    orders: Vec<order::Model>,
    items: Vec<I>,
    order_of: impl Fn(&I) -> i32,
) -> Vec<OrderWithItems<I>> {
    let mut by_order: HashMap<i32, Vec<I>> = HashMap::new();
    for item in items {
        by_order.entry(order_of(&item)).or_default().push(item);
    }

    orders
        .into_iter()
        .map(|order| OrderWithItems {
            items: by_order.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect()
}
