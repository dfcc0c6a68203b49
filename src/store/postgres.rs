use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    store::{PreviousVersion, Replaced, RouteQuery, RouteSort, RouteStore},
    types::model::route::{RouteContent, RouteDocument},
};

const COLUMNS: &str = "persistent_id, user_id, name, route_type, is_public, content, \
                       view_count, last_viewed, created_at, updated_at";

#[derive(sqlx::FromRow, Debug)]
struct RouteRow {
    persistent_id: Uuid,
    user_id: String,
    name: String,
    route_type: String,
    is_public: bool,
    content: Json<RouteContent>,
    view_count: i64,
    last_viewed: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RouteRow> for RouteDocument {
    type Error = Error;

    fn try_from(row: RouteRow) -> Result<Self> {
        Ok(RouteDocument {
            persistent_id: row.persistent_id,
            user_id: row.user_id,
            name: row.name,
            route_type: row.route_type.parse()?,
            is_public: row.is_public,
            content: row.content.0,
            view_count: row.view_count.max(0) as u64,
            last_viewed: row.last_viewed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PreviousRow {
    id: i64,
    #[sqlx(flatten)]
    version: PreviousVersion,
}

fn into_documents(rows: Vec<RouteRow>) -> Result<Vec<RouteDocument>> {
    rows.into_iter().map(RouteDocument::try_from).collect()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Routes table in Postgres. The document body lives in a jsonb column,
/// everything that is filtered or sorted on has its own column.
#[derive(Clone)]
pub struct PgRouteStore {
    pool: PgPool,
}

impl PgRouteStore {
    pub fn new(pool: PgPool) -> Self {
        PgRouteStore { pool }
    }

    async fn insert_with<'e, E>(executor: E, doc: &RouteDocument) -> sqlx::Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"insert into routes
            (persistent_id, user_id, name, route_type, is_public, content, view_count, last_viewed, created_at, updated_at)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(doc.persistent_id)
        .bind(&doc.user_id)
        .bind(&doc.name)
        .bind(doc.route_type.as_str())
        .bind(doc.is_public)
        .bind(Json(&doc.content))
        .bind(doc.view_count as i64)
        .bind(doc.last_viewed)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RouteStore for PgRouteStore {
    async fn find(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>> {
        let row = sqlx::query_as::<_, RouteRow>(&format!(
            "select {COLUMNS} from routes where persistent_id = $1"
        ))
        .bind(persistent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RouteDocument::try_from).transpose()
    }

    async fn insert(&self, doc: &RouteDocument) -> Result<()> {
        Self::insert_with(&self.pool, doc).await.map_err(|e| {
            if is_unique_violation(&e) {
                Error::Validation(format!("Route {} already exists", doc.persistent_id))
            } else {
                e.into()
            }
        })
    }

    #[instrument(skip(self, doc), fields(persistent_id = %doc.persistent_id))]
    async fn replace(&self, doc: &RouteDocument) -> Result<(RouteDocument, Replaced)> {
        let mut tx = self.pool.begin().await?;
        let previous: Vec<(i64, PreviousVersion)> = sqlx::query_as::<_, PreviousRow>(
            r#"select id, user_id, view_count, last_viewed, created_at
            from routes where persistent_id = $1 for update"#,
        )
        .bind(doc.persistent_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| (row.id, row.version))
        .collect();

        let mut stored = doc.clone();
        let replaced = match previous.first() {
            Some((_, version)) => {
                version.apply_to(&mut stored)?;
                Replaced::Updated
            }
            None => Replaced::Inserted,
        };

        Self::insert_with(&mut *tx, &stored).await?;
        let old_ids: Vec<i64> = previous.iter().map(|(id, _)| *id).collect();
        if !old_ids.is_empty() {
            sqlx::query("delete from routes where id = any($1)")
                .bind(&old_ids)
                .execute(&mut *tx)
                .await?;
        }
        // the deferred unique check runs here; losing a concurrent save surfaces as a conflict
        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!(
                    "Route {} was saved concurrently, retry the save",
                    doc.persistent_id
                ))
            } else {
                e.into()
            }
        })?;
        debug!("replaced {} previous rows", old_ids.len());
        Ok((stored, replaced))
    }

    async fn list(&self, query: &RouteQuery) -> Result<Vec<RouteDocument>> {
        let rows = sqlx::query_as::<_, RouteRow>(&format!(
            r#"select {COLUMNS} from routes
            where ($1::text is null or user_id = $1 or is_public)
              and (not $2 or is_public)
              and ($3::text is null or route_type = $3)
              and ($4::boolean is null or is_public = $4)
            order by case when $5 then view_count else 0 end desc, created_at desc"#
        ))
        .bind(query.visible_to.as_deref())
        .bind(query.public_only)
        .bind(query.route_type.map(|t| t.as_str()))
        .bind(query.is_public)
        .bind(query.sort == RouteSort::Views)
        .fetch_all(&self.pool)
        .await?;
        into_documents(rows)
    }

    async fn delete(&self, persistent_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("delete from routes where persistent_id = $1")
            .bind(persistent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("delete from saved_routes where persistent_id = $1")
            .bind(persistent_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_view(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>> {
        let row = sqlx::query_as::<_, RouteRow>(&format!(
            r#"update routes
            set view_count = view_count + 1, last_viewed = now()
            where persistent_id = $1 and is_public
            returning {COLUMNS}"#
        ))
        .bind(persistent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RouteDocument::try_from).transpose()
    }

    async fn find_by_track_id(&self, route_id: &str) -> Result<Option<RouteDocument>> {
        let row = sqlx::query_as::<_, RouteRow>(&format!(
            r#"select {COLUMNS} from routes
            where content->'routes' @> jsonb_build_array(jsonb_build_object('routeId', $1::text))
            limit 1"#
        ))
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RouteDocument::try_from).transpose()
    }

    async fn saved_route_ids(&self, user_id: &str) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            "select persistent_id from saved_routes where user_id = $1 order by saved_at, persistent_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"insert into saved_routes (user_id, persistent_id) values ($1, $2)
            on conflict (user_id, persistent_id) do nothing"#,
        )
        .bind(user_id)
        .bind(persistent_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("delete from saved_routes where user_id = $1 and persistent_id = $2")
                .bind(user_id)
                .bind(persistent_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
