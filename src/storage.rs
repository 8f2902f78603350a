// ABOUTME: SeaORM storage layer for users, articles, orders, and order items
// ABOUTME: Multi-statement writes (order placement, item replacement, imports) run inside transactions

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::collections::{BTreeSet, HashMap};

use crate::entities::{article, order, order_item, user};
use crate::error::{is_foreign_key_violation, is_unique_violation, AppError, Result};
use crate::migration::Migrator;
use crate::types::{ArticleChanges, NewArticle, OrderLine};

pub struct Storage {
    pub db: DatabaseConnection,
}

/// Outcome of provisioning a user from an identity event.
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    Created(user::Model),
    Existing(user::Model),
}

impl Storage {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = Database::connect(database_url).await?;
        Migrator::up(&db, None).await?;
        tracing::info!("database ready");
        Ok(Self { db })
    }

    // Users

    pub async fn find_user_by_external_id(&self, external_id: &str) -> Result<Option<user::Model>> {
        let user = user::Entity::find()
            .filter(user::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn provision_user(&self, external_id: &str, email: &str) -> Result<Provisioned> {
        if let Some(existing) = self.find_user_by_external_id(external_id).await? {
            return Ok(Provisioned::Existing(existing));
        }

        let user = user::ActiveModel {
            external_id: Set(external_id.to_string()),
            email: Set(email.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match user.insert(&self.db).await {
            Ok(created) => Ok(Provisioned::Created(created)),
            // A concurrent delivery of the same event won the insert.
            Err(err) if is_unique_violation(&err) => self
                .find_user_by_external_id(external_id)
                .await?
                .map(Provisioned::Existing)
                .ok_or(AppError::Database(err)),
            Err(err) => Err(err.into()),
        }
    }

    // Articles

    pub async fn list_articles(&self) -> Result<Vec<article::Model>> {
        let articles = article::Entity::find()
            .order_by_asc(article::Column::Id)
            .all(&self.db)
            .await?;
        Ok(articles)
    }

    pub async fn find_article(&self, id: i32) -> Result<Option<article::Model>> {
        Ok(article::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn articles_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, article::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let unique: BTreeSet<i32> = ids.iter().copied().collect();
        let articles = article::Entity::find()
            .filter(article::Column::Id.is_in(unique))
            .all(&self.db)
            .await?;

        Ok(articles.into_iter().map(|a| (a.id, a)).collect())
    }

    pub async fn create_article(&self, new: NewArticle) -> Result<article::Model> {
        Ok(article_row(new).insert(&self.db).await?)
    }

    pub async fn update_article(
        &self,
        id: i32,
        changes: ArticleChanges,
    ) -> Result<Option<article::Model>> {
        let Some(existing) = self.find_article(id).await? else {
            return Ok(None);
        };

        let mut active = existing.clone().into_active_model();
        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(image_url) = changes.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(glb_url) = changes.glb_url {
            active.glb_url = Set(glb_url);
        }

        if !active.is_changed() {
            return Ok(Some(existing));
        }

        match active.update(&self.db).await {
            Ok(updated) => Ok(Some(updated)),
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns false when no article had that id.
    pub async fn delete_article(&self, id: i32) -> Result<bool> {
        match article::Entity::delete_by_id(id).exec(&self.db).await {
            Ok(result) => Ok(result.rows_affected > 0),
            Err(err) if is_foreign_key_violation(&err) => Err(AppError::Conflict(format!(
                "Article {id} is referenced by existing orders"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn import_articles(&self, articles: Vec<NewArticle>) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }

        let count = articles.len();
        let txn = self.db.begin().await?;
        article::Entity::insert_many(articles.into_iter().map(article_row))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(count)
    }

    // Orders

    pub async fn orders_for_user(&self, user_id: i32) -> Result<Vec<order::Model>> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_asc(order::Column::Id)
            .all(&self.db)
            .await?;
        Ok(orders)
    }

    pub async fn all_orders(&self) -> Result<Vec<order::Model>> {
        let orders = order::Entity::find()
            .order_by_asc(order::Column::Id)
            .all(&self.db)
            .await?;
        Ok(orders)
    }

    pub async fn find_order(&self, id: i32) -> Result<Option<order::Model>> {
        Ok(order::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn items_for_orders(&self, order_ids: &[i32]) -> Result<Vec<order_item::Model>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.iter().copied()))
            .order_by_asc(order_item::Column::Id)
            .all(&self.db)
            .await?;
        Ok(items)
    }

    /// Inserts the order row and all of its lines atomically.
    pub async fn place_order(&self, user_id: i32, lines: &[OrderLine]) -> Result<order::Model> {
        let txn = self.db.begin().await?;

        ensure_articles_exist(&txn, lines).await?;

        let order = order::ActiveModel {
            user_id: Set(user_id),
            status: Set(order::DEFAULT_STATUS.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_lines(&txn, order.id, lines).await?;
        txn.commit().await?;

        tracing::info!(order_id = order.id, user_id, lines = lines.len(), "placed order");
        Ok(order)
    }

    /// Replaces the order's lines and/or status; `None` when the order does not exist.
    pub async fn update_order(
        &self,
        order_id: i32,
        lines: Option<&[OrderLine]>,
        status: Option<String>,
    ) -> Result<Option<order::Model>> {
        let txn = self.db.begin().await?;

        let Some(mut order) = order::Entity::find_by_id(order_id).one(&txn).await? else {
            return Ok(None);
        };

        if let Some(lines) = lines {
            ensure_articles_exist(&txn, lines).await?;
            order_item::Entity::delete_many()
                .filter(order_item::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await?;
            insert_lines(&txn, order_id, lines).await?;
        }

        if let Some(status) = status {
            let mut active = order.into_active_model();
            active.status = Set(status);
            order = active.update(&txn).await?;
        }

        txn.commit().await?;
        Ok(Some(order))
    }
}

fn article_row(new: NewArticle) -> article::ActiveModel {
    article::ActiveModel {
        title: Set(new.title),
        description: Set(new.description),
        price: Set(new.price),
        image_url: Set(new.image_url),
        glb_url: Set(new.glb_url),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
}

async fn ensure_articles_exist<C>(conn: &C, lines: &[OrderLine]) -> Result<()>
where
    C: ConnectionTrait,
{
    let wanted: BTreeSet<i32> = lines.iter().map(|line| line.article_id).collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let found: BTreeSet<i32> = article::Entity::find()
        .select_only()
        .column(article::Column::Id)
        .filter(article::Column::Id.is_in(wanted.iter().copied()))
        .into_tuple::<i32>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    match wanted.difference(&found).next() {
        Some(missing) => Err(AppError::BadRequest(format!(
            "Article {missing} does not exist"
        ))),
        None => Ok(()),
    }
}

async fn insert_lines<C>(conn: &C, order_id: i32, lines: &[OrderLine]) -> Result<()>
where
    C: ConnectionTrait,
{
    if lines.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let rows = lines.iter().map(|line| order_item::ActiveModel {
        order_id: Set(order_id),
        article_id: Set(line.article_id),
        quantity: Set(line.quantity),
        created_at: Set(now),
        ..Default::default()
    });

    order_item::Entity::insert_many(rows).exec(conn).await?;
    Ok(())
}
