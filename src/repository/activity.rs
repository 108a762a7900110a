//! Activity log repository (append-only)

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::activity::{ActivityEntry, ActivityQuery, NewActivity},
};

use super::paginate;

#[derive(Clone)]
pub struct ActivityRepository {
    pool: Pool<Postgres>,
}

/// Append an entry inside an open transaction
pub async fn insert(conn: &mut PgConnection, entry: &NewActivity) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (actor, action, details, entity_type, entity_id, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.meta.ip_address)
    .bind(&entry.meta.user_agent)
    .execute(conn)
    .await?;
    Ok(())
}

impl ActivityRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Append an entry outside of any transaction
    pub async fn log(&self, entry: &NewActivity) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, entry).await
    }

    /// List entries, newest first
    pub async fn list(&self, query: &ActivityQuery) -> AppResult<(Vec<ActivityEntry>, i64)> {
        let (limit, offset) = paginate(query.page, query.per_page, 50);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activity_log WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM activity_log WHERE TRUE");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let entries = select
            .build_query_as::<ActivityEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok((entries, total))
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ActivityQuery) {
    if let Some(ref action) = query.action {
        builder.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(ref entity_type) = query.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(ref actor) = query.actor {
        builder.push(" AND actor = ").push_bind(actor.clone());
    }
}
