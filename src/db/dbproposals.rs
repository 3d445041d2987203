use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sea_query::{Expr, Iden, Order, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use tracing::error;
use uuid::Uuid;

use crate::models::{Coordinate, NewPointChange, PointChangeProposal, ProposalDecision, ProposalStatus};
use crate::services::proposal_store::{ProposalStore, StoreError};

#[derive(Iden, Clone, Copy)]
enum RoutePointChanges {
    Table,
    Id,
    RouteId,
    UserId,
    UserDisplay,
    FeatureIndex,
    PointIndex,
    OriginalPosition,
    NewPosition,
    Status,
    CreatedAt,
    UpdatedAt,
    ResolvedAt,
    ResolvedBy,
}

const COLUMNS: [RoutePointChanges; 13] = [
    RoutePointChanges::Id,
    RoutePointChanges::RouteId,
    RoutePointChanges::UserId,
    RoutePointChanges::UserDisplay,
    RoutePointChanges::FeatureIndex,
    RoutePointChanges::PointIndex,
    RoutePointChanges::OriginalPosition,
    RoutePointChanges::NewPosition,
    RoutePointChanges::Status,
    RoutePointChanges::CreatedAt,
    RoutePointChanges::UpdatedAt,
    RoutePointChanges::ResolvedAt,
    RoutePointChanges::ResolvedBy,
];

/// Point change row from the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct PointChangeRow {
    id: Uuid,
    route_id: Uuid,
    user_id: Uuid,
    user_display: String,
    feature_index: i32,
    point_index: i32,
    original_position: Json<Coordinate>,
    new_position: Json<Coordinate>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
}

impl TryFrom<PointChangeRow> for PointChangeProposal {
    type Error = StoreError;

    fn try_from(row: PointChangeRow) -> Result<Self, Self::Error> {
        let status = ProposalStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("Unknown point change status '{}'", row.status)))?;
        let index = |value: i32| {
            u32::try_from(value).map_err(|_| StoreError::Backend(format!("Negative index {} in point change {}", value, row.id)))
        };
        Ok(PointChangeProposal {
            id: row.id,
            route_id: row.route_id,
            user_id: row.user_id,
            user_display: row.user_display.clone(),
            feature_index: index(row.feature_index)?,
            point_index: index(row.point_index)?,
            original_position: row.original_position.0,
            new_position: row.new_position.0,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
        })
    }
}

/// Indices are stored as INTEGER
fn index_column(name: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Invalid(format!("{} {} is out of range", name, value)))
}

fn backend(e: sqlx::Error) -> StoreError {
    error!("Point change query failed: {}", e);
    StoreError::Backend(e.to_string())
}

/// Proposals in the `route_point_changes` table
#[derive(Debug, Clone)]
pub struct PgProposalStore {
    pool: PgPool,
}

impl PgProposalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<PointChangeProposal>, StoreError> {
        let row = sqlx::query_as::<_, PointChangeRow>("SELECT * FROM route_point_changes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(PointChangeProposal::try_from).transpose()
    }
}

impl ProposalStore for PgProposalStore {
    fn create(&self, new: NewPointChange) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            let feature_index = index_column("feature_index", new.feature_index)?;
            let point_index = index_column("point_index", new.point_index)?;
            let row = sqlx::query_as::<_, PointChangeRow>(
                r#"
                INSERT INTO route_point_changes (
                    route_id, user_id, user_display, feature_index, point_index,
                    original_position, new_position, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
                RETURNING *
                "#,
            )
            .bind(new.route_id)
            .bind(new.user_id)
            .bind(&new.user_display)
            .bind(feature_index)
            .bind(point_index)
            .bind(Json(new.original_position))
            .bind(Json(new.new_position))
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
            PointChangeProposal::try_from(row)
        })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'_, Result<Option<PointChangeProposal>, StoreError>> {
        Box::pin(self.fetch(id))
    }

    fn list(&self, route_id: Uuid, status: Option<ProposalStatus>) -> BoxFuture<'_, Result<Vec<PointChangeProposal>, StoreError>> {
        Box::pin(async move {
            let mut query = Query::select();
            query
                .columns(COLUMNS)
                .from(RoutePointChanges::Table)
                .and_where(Expr::col(RoutePointChanges::RouteId).eq(route_id))
                .order_by(RoutePointChanges::CreatedAt, Order::Desc);
            if let Some(status) = status {
                query.and_where(Expr::col(RoutePointChanges::Status).eq(status.as_str()));
            }
            let (sql, values) = query.build_sqlx(PostgresQueryBuilder);

            let rows = sqlx::query_as_with::<_, PointChangeRow, _>(&sql, values)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
            rows.into_iter().map(PointChangeProposal::try_from).collect()
        })
    }

    fn resolve(
        &self,
        id: Uuid,
        resolver: Uuid,
        decision: ProposalDecision,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            let status: ProposalStatus = decision.into();
            // Only a pending row matches, so concurrent resolves cannot both succeed
            let row = sqlx::query_as::<_, PointChangeRow>(
                r#"
                UPDATE route_point_changes
                SET status = $2, resolved_at = $3, resolved_by = $4, updated_at = $3
                WHERE id = $1 AND status = 'pending'
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .bind(resolver)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

            match row {
                Some(row) => PointChangeProposal::try_from(row),
                None => match self.fetch(id).await? {
                    Some(_) => Err(StoreError::AlreadyResolved(id)),
                    None => Err(StoreError::NotFound(id)),
                },
            }
        })
    }

    fn reopen(&self, id: Uuid) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            // Undoes an acceptance claim only, never a rejection
            let row = sqlx::query_as::<_, PointChangeRow>(
                r#"
                UPDATE route_point_changes
                SET status = 'pending', resolved_at = NULL, resolved_by = NULL, updated_at = NOW()
                WHERE id = $1 AND status = 'accepted'
                RETURNING *
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

            match row {
                Some(row) => PointChangeProposal::try_from(row),
                None => match self.fetch(id).await? {
                    Some(_) => Err(StoreError::NotAccepted(id)),
                    None => Err(StoreError::NotFound(id)),
                },
            }
        })
    }

    fn archive_resolved(&self, before: DateTime<Utc>) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "DELETE FROM route_point_changes WHERE status <> 'pending' AND resolved_at < $1",
            )
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
            Ok(result.rows_affected())
        })
    }
}
