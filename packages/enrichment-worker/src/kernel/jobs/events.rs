//! Job-scoped structured event log.
//!
//! Every logger also mirrors entries to `tracing` at the matching level.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::common::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub event: String,
    pub message: String,
    pub data: serde_json::Value,
    pub severity: EventSeverity,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BaseEventLogger: Send + Sync {
    async fn log_event(
        &self,
        job_id: JobId,
        event: &str,
        message: &str,
        data: serde_json::Value,
        severity: EventSeverity,
    ) -> Result<()>;
}

fn mirror_to_tracing(job_id: JobId, event: &str, message: &str, data: &serde_json::Value, severity: EventSeverity) {
    match severity {
        EventSeverity::Debug => debug!(job_id = %job_id, event, data = %data, "{}", message),
        EventSeverity::Info => info!(job_id = %job_id, event, data = %data, "{}", message),
        EventSeverity::Warning => warn!(job_id = %job_id, event, data = %data, "{}", message),
        EventSeverity::Error => error!(job_id = %job_id, event, data = %data, "{}", message),
    }
}

/// Logger that only writes to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingEventLogger;

#[async_trait]
impl BaseEventLogger for TracingEventLogger {
    async fn log_event(
        &self,
        job_id: JobId,
        event: &str,
        message: &str,
        data: serde_json::Value,
        severity: EventSeverity,
    ) -> Result<()> {
        mirror_to_tracing(job_id, event, message, &data, severity);
        Ok(())
    }
}

/// Logger that appends to the `job_events` table.
#[derive(Clone)]
pub struct PostgresEventLogger {
    pool: PgPool,
}

impl PostgresEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseEventLogger for PostgresEventLogger {
    async fn log_event(
        &self,
        job_id: JobId,
        event: &str,
        message: &str,
        data: serde_json::Value,
        severity: EventSeverity,
    ) -> Result<()> {
        mirror_to_tracing(job_id, event, message, &data, severity);

        sqlx::query(
            r#"
            INSERT INTO job_events (job_id, event, message, data, severity)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job_id)
        .bind(event)
        .bind(message)
        .bind(&data)
        .bind(severity)
        .execute(&self.pool)
        .await
        .context("Failed to insert job event")?;

        Ok(())
    }
}

/// In-memory logger for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryEventLogger {
    events: Mutex<Vec<JobEvent>>,
}

impl MemoryEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events_named(&self, event: &str) -> Vec<JobEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }

    pub fn has_event(&self, event: &str) -> bool {
        !self.events_named(event).is_empty()
    }
}

#[async_trait]
impl BaseEventLogger for MemoryEventLogger {
    async fn log_event(
        &self,
        job_id: JobId,
        event: &str,
        message: &str,
        data: serde_json::Value,
        severity: EventSeverity,
    ) -> Result<()> {
        mirror_to_tracing(job_id, event, message, &data, severity);

        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(JobEvent {
                job_id,
                event: event.to_string(),
                message: message.to_string(),
                data,
                severity,
                created_at: Utc::now(),
            });
        Ok(())
    }
}
