//! Live appointment feed.
//!
//! An [`AppointmentFeed`] turns raw appointment lists into triaged batches for a dashboard.
//! Lists arrive either pushed over a channel or fetched on a fixed interval. Push is
//! preferred; when the push channel closes (or was never provided) the feed falls back to
//! polling. The two never run at the same time, so one appointment is never classified by
//! two refreshes at once.
//!
//! Every list is classified through the shared [`TriageService`] (memoised per appointment),
//! checked for recent facility edits, and delivered as a [`ReconciledBatch`].
//!
//! Shutdown is signalled through a `watch` channel. Work in flight when shutdown is seen is
//! dropped, and nothing is notified or delivered afterwards.

use crate::error::{PortalError, PortalResult};
use crate::model::{Appointment, ClassifiedAppointment};
use crate::modifications::{announce, detect_modifications_within, NotificationEvent};
use crate::notify::Notifier;
use crate::repositories::AppointmentService;
use crate::triage::TriageService;
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

type FetchFuture = Pin<Box<dyn Future<Output = PortalResult<Vec<Appointment>>> + Send>>;
type FetchFn = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Fixed-interval source of appointment lists.
#[derive(Clone)]
pub struct PollSource {
    interval: Duration,
    fetch: FetchFn,
}

impl PollSource {
    pub fn new<F, Fut>(interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PortalResult<Vec<Appointment>>> + Send + 'static,
    {
        Self {
            interval,
            fetch: Arc::new(move || Box::pin(fetch())),
        }
    }

    /// Polls every appointment booked against one facility.
    pub fn facility(interval: Duration, appointments: AppointmentService, facility_id: String) -> Self {
        Self::new(interval, move || {
            let appointments = appointments.clone();
            let facility_id = facility_id.clone();
            async move {
                tokio::task::spawn_blocking(move || appointments.list_for_facility(&facility_id))
                    .await
                    .map_err(|e| PortalError::Task(e.to_string()))?
            }
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for PollSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSource")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct FeedSources {
    pub push: Option<mpsc::Receiver<Vec<Appointment>>>,
    pub poll: Option<PollSource>,
}

impl FeedSources {
    pub fn push(receiver: mpsc::Receiver<Vec<Appointment>>) -> Self {
        Self {
            push: Some(receiver),
            poll: None,
        }
    }

    pub fn poll(source: PollSource) -> Self {
        Self {
            push: None,
            poll: Some(source),
        }
    }

    pub fn with_poll(mut self, source: PollSource) -> Self {
        self.poll = Some(source);
        self
    }
}

/// One refreshed appointment list, triaged, with the edit notifications it raised.
#[derive(Clone, Debug, Serialize)]
pub struct ReconciledBatch {
    pub appointments: Vec<ClassifiedAppointment>,
    pub notifications: Vec<NotificationEvent>,
}

/// Why [`AppointmentFeed::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedExit {
    Shutdown,
    /// Push closed and there is no poll source.
    SourcesClosed,
    /// The batch receiver was dropped.
    ConsumerGone,
}

pub struct AppointmentFeed {
    triage: TriageService,
    notifier: Arc<dyn Notifier>,
    notify_window: Duration,
}

impl AppointmentFeed {
    pub fn new(triage: TriageService, notifier: Arc<dyn Notifier>, notify_window: Duration) -> Self {
        Self {
            triage,
            notifier,
            notify_window,
        }
    }

    pub async fn run(
        &self,
        sources: FeedSources,
        out: mpsc::Sender<ReconciledBatch>,
        mut shutdown: watch::Receiver<bool>,
    ) -> FeedExit {
        let FeedSources { mut push, poll } = sources;

        if let Some(receiver) = push.as_mut() {
            tracing::info!("appointment feed following push updates");
            loop {
                let Some(received) = until_shutdown(&mut shutdown, receiver.recv()).await else {
                    return FeedExit::Shutdown;
                };
                let Some(list) = received else {
                    tracing::info!("push channel closed, falling back to polling");
                    break;
                };
                if let Some(exit) = self.deliver(list, &out, &mut shutdown).await {
                    return exit;
                }
            }
        }

        let Some(poll) = poll else {
            return FeedExit::SourcesClosed;
        };

        tracing::info!(interval_secs = poll.interval.as_secs(), "appointment feed polling");
        let mut ticker = tokio::time::interval(poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if until_shutdown(&mut shutdown, ticker.tick()).await.is_none() {
                return FeedExit::Shutdown;
            }
            let Some(fetched) = until_shutdown(&mut shutdown, (poll.fetch)()).await else {
                return FeedExit::Shutdown;
            };
            match fetched {
                Ok(list) => {
                    if let Some(exit) = self.deliver(list, &out, &mut shutdown).await {
                        return exit;
                    }
                }
                Err(e) => tracing::warn!("appointment poll failed: {e}"),
            }
        }
    }

    /// Classifies one list and detects facility edits in it.
    pub async fn reconcile(&self, appointments: Vec<Appointment>) -> ReconciledBatch {
        let notifications = detect_modifications_within(&appointments, Utc::now(), self.notify_window);
        let appointments = self.triage.annotate(appointments).await;
        ReconciledBatch {
            appointments,
            notifications,
        }
    }

    async fn deliver(
        &self,
        list: Vec<Appointment>,
        out: &mpsc::Sender<ReconciledBatch>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<FeedExit> {
        let Some(batch) = until_shutdown(shutdown, self.reconcile(list)).await else {
            return Some(FeedExit::Shutdown);
        };
        if *shutdown.borrow() {
            return Some(FeedExit::Shutdown);
        }

        self.triage
            .cache()
            .retain_ids(batch.appointments.iter().map(|c| c.appointment.id.as_str()));
        announce(&batch.notifications, self.notifier.as_ref());

        match until_shutdown(shutdown, out.send(batch)).await {
            None => Some(FeedExit::Shutdown),
            Some(Err(_)) => Some(FeedExit::ConsumerGone),
            Some(Ok(())) => None,
        }
    }
}

/// Runs `fut` unless shutdown is (or becomes) set. A dropped shutdown sender counts as
/// shutdown.
async fn until_shutdown<F: Future>(shutdown: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.wait_for(|stop| *stop) => None,
        out = fut => Some(out),
    }
}
