use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::restoration::RestorationModel;
use crate::models::task::{Backend, Task, TaskStatus};

const TASK_COLUMNS: &str = "id, status, source, output, model, uploaded_to, source_uploaded_to, \
                            error, created_at, updated_at";

/// Durable record of every submitted task. Rows are never deleted.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new task at `Pending`.
    pub async fn create(
        &self,
        source: &str,
        output: &str,
        model: RestorationModel,
    ) -> Result<Task, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (status, source, output, model, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(TaskStatus::Pending.as_ref())
        .bind(source)
        .bind(output)
        .bind(model.as_ref())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Task {
            id: result.last_insert_rowid(),
            status: TaskStatus::Pending,
            source: source.to_string(),
            output: output.to_string(),
            model,
            uploaded_to: None,
            source_uploaded_to: None,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Look up a task. Unknown ids are `Ok(None)`.
    pub async fn get(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    /// Advance a task's status, enforcing the forward-only order.
    ///
    /// The update is conditional on the status read beforehand, so a
    /// concurrent writer makes this call fail instead of silently regressing.
    pub async fn update_status(&self, id: i64, status: TaskStatus) -> Result<(), StoreError> {
        self.transition(id, status, None).await
    }

    /// Move a live task to `Failed`, recording why.
    ///
    /// Returns `false` when the task had already reached a terminal phase.
    pub async fn mark_failed(&self, id: i64, reason: &str) -> Result<bool, StoreError> {
        match self.transition(id, TaskStatus::Failed, Some(reason)).await {
            Ok(()) => Ok(true),
            Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Record the backend holding the output. Set exactly once.
    pub async fn set_uploaded_to(&self, id: i64, backend: Backend) -> Result<(), StoreError> {
        self.set_backend_once(id, "uploaded_to", backend).await
    }

    /// Record the backend holding the source copy. Set exactly once.
    pub async fn set_source_uploaded_to(&self, id: i64, backend: Backend) -> Result<(), StoreError> {
        self.set_backend_once(id, "source_uploaded_to", backend).await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn transition(
        &self,
        id: i64,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let current = self.get(id).await?.ok_or(StoreError::NotFound(id))?;
        if !current.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to: status,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?1,
                error = COALESCE(?2, error),
                updated_at = ?3
            WHERE id = ?4 AND status = ?5
            "#,
        )
        .bind(status.as_ref())
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .bind(current.status.as_ref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let now = self.get(id).await?.ok_or(StoreError::NotFound(id))?;
            return Err(StoreError::InvalidTransition {
                id,
                from: now.status,
                to: status,
            });
        }

        Ok(())
    }

    async fn set_backend_once(
        &self,
        id: i64,
        column: &'static str,
        backend: Backend,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET {column} = ?1, updated_at = ?2 WHERE id = ?3 AND {column} IS NULL"
        ))
        .bind(backend.as_ref())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(StoreError::BackendAlreadySet { id, column }),
                None => Err(StoreError::NotFound(id)),
            };
        }

        Ok(())
    }
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let status: String = row.try_get("status")?;
    let model: String = row.try_get("model")?;
    let uploaded_to: Option<String> = row.try_get("uploaded_to")?;
    let source_uploaded_to: Option<String> = row.try_get("source_uploaded_to")?;

    Ok(Task {
        id: row.try_get("id")?,
        status: parse_column("status", &status)?,
        source: row.try_get("source")?,
        output: row.try_get("output")?,
        model: parse_column("model", &model)?,
        uploaded_to: uploaded_to
            .as_deref()
            .map(|v| parse_column("uploaded_to", v))
            .transpose()?,
        source_uploaded_to: source_uploaded_to
            .as_deref()
            .map(|v| parse_column("source_uploaded_to", v))
            .transpose()?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task {0} not found")]
    NotFound(i64),

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {id} already has {column} set")]
    BackendAlreadySet { id: i64, column: &'static str },

    #[error("Unrecognized value {value:?} in column {column}")]
    Corrupt { column: &'static str, value: String },
}
