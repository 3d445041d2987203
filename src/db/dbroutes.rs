use futures_util::future::BoxFuture;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::route_directory::{RouteDirectory, RouteDirectoryError, VersionAuthor};
use crate::models::Coordinate;

fn backend(e: sqlx::Error) -> RouteDirectoryError {
    error!("Route query failed: {}", e);
    RouteDirectoryError::Backend(e.to_string())
}

/// Route geometry stored in `routes.control_points`, with one
/// `route_versions` row per accepted write
#[derive(Debug, Clone)]
pub struct PgRouteDirectory {
    pool: PgPool,
}

impl PgRouteDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the route row, apply `edit` and record a version, in one transaction
    async fn write_version(
        &self,
        route_id: Uuid,
        author: VersionAuthor,
        edit: impl FnOnce(&mut Vec<Coordinate>) -> Result<(), RouteDirectoryError> + Send,
    ) -> Result<Uuid, RouteDirectoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let current: Option<Json<Vec<Coordinate>>> =
            sqlx::query_scalar("SELECT control_points FROM routes WHERE id = $1 FOR UPDATE")
                .bind(route_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let Json(mut points) = current.ok_or(RouteDirectoryError::RouteNotFound(route_id))?;
        edit(&mut points)?;

        sqlx::query("UPDATE routes SET control_points = $2, updated_at = NOW() WHERE id = $1")
            .bind(route_id)
            .bind(Json(&points))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let version_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO route_versions (route_id, control_points, created_by, contributed_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(route_id)
        .bind(Json(&points))
        .bind(author.applied_by)
        .bind(author.contributor)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        info!("Stored version {} of route {}", version_id, route_id);
        Ok(version_id)
    }
}

impl RouteDirectory for PgRouteDirectory {
    fn get_route_owner(&self, route_id: Uuid) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, Uuid>("SELECT owner_id FROM routes WHERE id = $1")
                .bind(route_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?
                .ok_or(RouteDirectoryError::RouteNotFound(route_id))
        })
    }

    fn get_control_points(&self, route_id: Uuid) -> BoxFuture<'_, Result<Vec<Coordinate>, RouteDirectoryError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, Json<Vec<Coordinate>>>("SELECT control_points FROM routes WHERE id = $1")
                .bind(route_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?
                .map(|Json(points)| points)
                .ok_or(RouteDirectoryError::RouteNotFound(route_id))
        })
    }

    fn replace_control_point(
        &self,
        route_id: Uuid,
        index: usize,
        position: Coordinate,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            self.write_version(route_id, author, move |points| {
                let len = points.len();
                let slot = points
                    .get_mut(index)
                    .ok_or(RouteDirectoryError::IndexOutOfRange { index, len })?;
                *slot = position;
                Ok(())
            })
            .await
        })
    }

    fn replace_control_points(
        &self,
        route_id: Uuid,
        new_points: Vec<Coordinate>,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            self.write_version(route_id, author, move |points| {
                *points = new_points;
                Ok(())
            })
            .await
        })
    }
}
