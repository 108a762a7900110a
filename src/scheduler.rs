//! Cron scheduler for the overdue sweep and the notification queue.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use crate::{config::SchedulerConfig, error::AppError, services::Services};

/// Runs the periodic jobs against the shared services
pub struct CronScheduler {
    scheduler: JobScheduler,
    services: Arc<Services>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("overdue_cron", &self.config.overdue_cron)
            .field("notification_cron", &self.config.notification_cron)
            .finish()
    }
}

impl CronScheduler {
    pub async fn new(services: Arc<Services>, config: SchedulerConfig) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            services,
            config,
        })
    }

    /// Register the overdue sweep and the queue flush
    pub async fn register_tasks(&self) -> Result<(), AppError> {
        self.register_overdue_sweep().await?;
        self.register_notification_flush().await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    async fn register_overdue_sweep(&self) -> Result<(), AppError> {
        let services = Arc::clone(&self.services);
        let job = CronJob::new_async(self.config.overdue_cron.as_str(), move |_uuid, _lock| {
            let services = Arc::clone(&services);
            Box::pin(async move {
                match services.loans.run_overdue_sweep().await {
                    Ok(report) => tracing::info!(
                        processed = report.processed_count,
                        total_overdue = report.total_overdue,
                        "Scheduled overdue sweep finished"
                    ),
                    Err(e) => tracing::error!("Scheduled overdue sweep failed: {}", e),
                }
            })
        })
        .map_err(|e| AppError::Internal(format!("Failed to create overdue_sweep schedule: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add overdue_sweep schedule: {}", e)))?;

        tracing::info!("Registered: overdue_sweep ({})", self.config.overdue_cron);
        Ok(())
    }

    async fn register_notification_flush(&self) -> Result<(), AppError> {
        let services = Arc::clone(&self.services);
        let job = CronJob::new_async(self.config.notification_cron.as_str(), move |_uuid, _lock| {
            let services = Arc::clone(&services);
            Box::pin(async move {
                match services.notifications.flush_queue().await {
                    Ok(report) if report.sent + report.failed > 0 => tracing::info!(
                        sent = report.sent,
                        failed = report.failed,
                        "Notification queue flushed"
                    ),
                    Ok(_) => tracing::trace!("Notification queue empty"),
                    Err(e) => tracing::error!("Notification flush failed: {}", e),
                }
            })
        })
        .map_err(|e| {
            AppError::Internal(format!("Failed to create notification_flush schedule: {}", e))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::Internal(format!("Failed to add notification_flush schedule: {}", e))
        })?;

        tracing::info!("Registered: notification_flush ({})", self.config.notification_cron);
        Ok(())
    }
}
