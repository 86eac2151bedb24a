//! Repeating jobs
//!
//! The update cycle runs on a [`Scheduler`]. [`CronScheduler`] runs it on
//! `tokio-cron-scheduler`, starting with one run right away.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::{
    chat::ErrorReporter, client::NewsSource, message::Deliver, service::NewsfeedService, Error,
};

/// A job run again and again, returning a fresh future every time.
pub type RepeatingJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Scheduler
where
    Self: Send,
{
    /// Run `job` now and then every `interval`.
    async fn run_repeating(&mut self, interval: Duration, job: RepeatingJob) -> Result<(), Error>;
}

/// Skip runs of `job` that start while a previous run is still going.
pub fn exclusive(job: RepeatingJob) -> RepeatingJob {
    let running = Arc::new(tokio::sync::Mutex::new(()));
    Arc::new(move || {
        let job = job.clone();
        let running = running.clone();
        async move {
            let Ok(_guard) = running.try_lock_owned() else {
                warn!("previous run is still in progress, skipping this tick");
                return;
            };
            job().await;
        }
        .boxed()
    })
}

pub struct CronScheduler {
    scheduler: JobScheduler,
}

impl CronScheduler {
    pub async fn new() -> Result<Self, Error> {
        let scheduler = JobScheduler::new().await?;
        scheduler.start().await?;
        Ok(Self { scheduler })
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn run_repeating(&mut self, interval: Duration, job: RepeatingJob) -> Result<(), Error> {
        let job = exclusive(job);

        let first = job.clone();
        tokio::spawn(async move { first().await });

        let job = Job::new_repeated_async(interval, move |_uuid, _scheduler| job())?;
        let uuid = self.scheduler.add(job).await?;
        info!("scheduled job {uuid} every {}s", interval.as_secs());

        Ok(())
    }
}

/// Run one update cycle, reporting whatever went wrong to the admins.
pub async fn run_cycle<C, D, R>(service: &NewsfeedService<C, D>, reporter: &ErrorReporter<R>)
where
    C: NewsSource,
    D: Deliver,
    R: Deliver,
{
    match service.check_for_updates().await {
        Ok(report) => {
            for (id, error) in report.failures() {
                reporter
                    .report(&format!("Failed to process news {id}"), error, None)
                    .await;
            }
            info!(
                "cycle done: {} processed, {} failed, {} ids saved",
                report.succeeded().count(),
                report.failures().count(),
                report.saved().len()
            );
        }
        Err(error) => {
            reporter
                .report("Failed to check for news", &error, None)
                .await
        }
    }
}

/// The update cycle as a [`RepeatingJob`].
pub fn news_job<C, D, R>(
    service: Arc<NewsfeedService<C, D>>,
    reporter: Arc<ErrorReporter<R>>,
) -> RepeatingJob
where
    C: NewsSource + 'static,
    D: Deliver + 'static,
    R: Deliver + 'static,
{
    Arc::new(move || {
        let service = service.clone();
        let reporter = reporter.clone();
        async move { run_cycle(&*service, &*reporter).await }.boxed()
    })
}
