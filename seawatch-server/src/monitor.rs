//! Periodic detection service.
//!
//! One [`MonitorService`] task owns the [`ActivityOrchestrator`]. Timers and
//! operator commands are served from a single `select!` loop, so ticks never
//! overlap and lifecycle calls never race a tick. Late ticks are skipped.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ MonitorService (tokio task)                        │
//! │  - collision / activity / cleanup intervals        │
//! │  - pulls one snapshot per tick from VesselSource   │
//! │  - answers MonitorCommand with oneshot replies     │
//! └────────────────────────────────────────────────────┘
//!          ▲ mpsc                      │ broadcast
//!          │                           ▼
//! ┌────────────────────────────────────────────────────┐
//! │ MonitorHandle                                      │
//! │  - lifecycle mutators (bool)                       │
//! │  - queries, subscribe(), stop()                    │
//! └────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use seawatch_core::activity::{
    ActivityStatistics, ActivityType, HistoryEntry, Severity, SuspiciousActivity,
};
use seawatch_core::collision::CollisionAlert;
use seawatch_core::loitering::LoiteringEvent;
use seawatch_core::rendezvous::RendezvousEvent;
use seawatch_core::settings::ActivitySettings;
use seawatch_core::{ActivityOrchestrator, MonitorSettings, Position, VesselId, VesselSource};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use crate::now_millis;

const COMMAND_QUEUE: usize = 64;
const UPDATE_QUEUE: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The service task has exited
    #[error("Monitor service is not running")]
    Stopped,
}

/// Which tick produced an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    Collision,
    Activity,
}

/// State published after every tick
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorUpdate {
    pub kind: UpdateKind,
    pub timestamp: u64,
    pub vessel_count: usize,
    pub collision_alerts: Vec<CollisionAlert>,
    pub rendezvous_events: Vec<RendezvousEvent>,
    pub loitering_events: Vec<LoiteringEvent>,
    /// Finished meetings kept until cleanup
    pub completed_rendezvous: Vec<RendezvousEvent>,
    /// Finished loitering kept until cleanup
    pub completed_loitering: Vec<LoiteringEvent>,
    /// Activities neither resolved nor dismissed
    pub activities: Vec<SuspiciousActivity>,
    /// Activities still in state NEW
    pub pending: Vec<SuspiciousActivity>,
    pub statistics: ActivityStatistics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityFilter {
    All,
    Pending,
    Active,
    Vessel(VesselId),
    Type(ActivityType),
}

/// Requests served by the service task
#[derive(Debug)]
pub enum MonitorCommand {
    Acknowledge {
        id: String,
        user: String,
        reply: oneshot::Sender<bool>,
    },
    Investigate {
        id: String,
        user: String,
        reply: oneshot::Sender<bool>,
    },
    Resolve {
        id: String,
        user: String,
        resolution: String,
        reply: oneshot::Sender<bool>,
    },
    FalsePositive {
        id: String,
        user: String,
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    Escalate {
        id: String,
        user: String,
        target: String,
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    AddNote {
        id: String,
        user: String,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    CreateOther {
        severity: Severity,
        vessels: Vec<VesselId>,
        location: Position,
        description: String,
        metrics: BTreeMap<String, f64>,
        reply: oneshot::Sender<String>,
    },
    Activity {
        id: String,
        reply: oneshot::Sender<Option<SuspiciousActivity>>,
    },
    Activities {
        filter: ActivityFilter,
        reply: oneshot::Sender<Vec<SuspiciousActivity>>,
    },
    History {
        id: String,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    Statistics {
        reply: oneshot::Sender<ActivityStatistics>,
    },
    /// Run an activity tick now instead of waiting for the timer
    Tick {
        reply: oneshot::Sender<MonitorUpdate>,
    },
}

/// Clonable client of a running [`MonitorService`]
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    tx_command: mpsc::Sender<MonitorCommand>,
    tx_update: broadcast::Sender<MonitorUpdate>,
    cancel: CancellationToken,
}

impl MonitorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
    ) -> Result<T, MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.tx_command
            .send(make(reply))
            .await
            .map_err(|_| MonitorError::Stopped)?;
        rx.await.map_err(|_| MonitorError::Stopped)
    }

    pub async fn acknowledge(&self, id: &str, user: &str) -> bool {
        self.request(|reply| MonitorCommand::Acknowledge {
            id: id.to_string(),
            user: user.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn investigate(&self, id: &str, user: &str) -> bool {
        self.request(|reply| MonitorCommand::Investigate {
            id: id.to_string(),
            user: user.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn resolve(&self, id: &str, user: &str, resolution: &str) -> bool {
        self.request(|reply| MonitorCommand::Resolve {
            id: id.to_string(),
            user: user.to_string(),
            resolution: resolution.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn mark_false_positive(&self, id: &str, user: &str, reason: &str) -> bool {
        self.request(|reply| MonitorCommand::FalsePositive {
            id: id.to_string(),
            user: user.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn escalate(&self, id: &str, user: &str, target: &str, reason: &str) -> bool {
        self.request(|reply| MonitorCommand::Escalate {
            id: id.to_string(),
            user: user.to_string(),
            target: target.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn add_note(&self, id: &str, user: &str, text: &str) -> bool {
        self.request(|reply| MonitorCommand::AddNote {
            id: id.to_string(),
            user: user.to_string(),
            text: text.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn create_other(
        &self,
        severity: Severity,
        vessels: Vec<VesselId>,
        location: Position,
        description: &str,
        metrics: BTreeMap<String, f64>,
    ) -> Result<String, MonitorError> {
        self.request(|reply| MonitorCommand::CreateOther {
            severity,
            vessels,
            location,
            description: description.to_string(),
            metrics,
            reply,
        })
        .await
    }

    pub async fn activity(&self, id: &str) -> Result<Option<SuspiciousActivity>, MonitorError> {
        self.request(|reply| MonitorCommand::Activity {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn activities(
        &self,
        filter: ActivityFilter,
    ) -> Result<Vec<SuspiciousActivity>, MonitorError> {
        self.request(|reply| MonitorCommand::Activities { filter, reply })
            .await
    }

    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, MonitorError> {
        self.request(|reply| MonitorCommand::History {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn statistics(&self) -> Result<ActivityStatistics, MonitorError> {
        self.request(|reply| MonitorCommand::Statistics { reply }).await
    }

    pub async fn tick(&self) -> Result<MonitorUpdate, MonitorError> {
        self.request(|reply| MonitorCommand::Tick { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorUpdate> {
        self.tx_update.subscribe()
    }

    /// Ask the service to finish its current tick and exit
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Owns the orchestrator and runs it on a schedule
pub struct MonitorService<S> {
    orchestrator: ActivityOrchestrator,
    source: S,
    schedule: ActivitySettings,
    /// Vessels silent for longer than this are dropped from the source
    vessel_timeout: Option<Duration>,
    rx_command: mpsc::Receiver<MonitorCommand>,
    tx_update: broadcast::Sender<MonitorUpdate>,
    cancel: CancellationToken,
}

impl<S: VesselSource + Send + 'static> MonitorService<S> {
    pub fn new(settings: &MonitorSettings, source: S) -> (Self, MonitorHandle) {
        let (tx_command, rx_command) = mpsc::channel(COMMAND_QUEUE);
        let (tx_update, _) = broadcast::channel(UPDATE_QUEUE);
        let cancel = CancellationToken::new();

        let service = MonitorService {
            orchestrator: ActivityOrchestrator::new(settings),
            source,
            schedule: settings.activity.clone(),
            vessel_timeout: None,
            rx_command,
            tx_update: tx_update.clone(),
            cancel: cancel.clone(),
        };
        let handle = MonitorHandle {
            tx_command,
            tx_update,
            cancel,
        };
        (service, handle)
    }

    pub fn with_vessel_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.vessel_timeout = timeout;
        self
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "Monitor: starting (collision {}s, activity {}s, cleanup {}s)",
            self.schedule.collision_tick, self.schedule.activity_tick, self.schedule.cleanup_interval
        );

        let mut collision_timer = interval(seconds(self.schedule.collision_tick));
        collision_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut activity_timer = interval(seconds(self.schedule.activity_tick));
        activity_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cleanup_period = seconds(self.schedule.cleanup_interval);
        let mut cleanup_timer = interval_at(Instant::now() + cleanup_period, cleanup_period);
        cleanup_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Monitor: stop requested");
                    break;
                }
                _ = collision_timer.tick() => {
                    let update = self.collision_tick();
                    self.publish(update);
                }
                _ = activity_timer.tick() => {
                    let update = self.activity_tick();
                    self.publish(update);
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup();
                }
                command = self.rx_command.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("Monitor: all handles dropped");
                        break;
                    }
                }
            }
        }

        // Answer whatever was queued before the stop
        self.rx_command.close();
        while let Ok(command) = self.rx_command.try_recv() {
            self.handle(command);
        }

        info!("Monitor: finished");
        Ok(())
    }

    fn snapshot(&self, now: u64) -> Vec<seawatch_core::KinematicSnapshot> {
        let vessels = self.source.all_vessels();
        match self.vessel_timeout {
            Some(timeout) => {
                let cutoff = now.saturating_sub(timeout.as_millis() as u64);
                vessels.into_iter().filter(|v| v.timestamp >= cutoff).collect()
            }
            None => vessels,
        }
    }

    fn collision_tick(&mut self) -> MonitorUpdate {
        let now = now_millis();
        let vessels = self.snapshot(now);
        self.orchestrator.collision_tick(&vessels, now);
        self.update(UpdateKind::Collision, now, vessels.len())
    }

    fn activity_tick(&mut self) -> MonitorUpdate {
        let now = now_millis();
        let vessels = self.snapshot(now);
        let tick = self.orchestrator.activity_tick(&vessels, now);
        if !tick.created.is_empty() {
            info!("Monitor: {} new activities", tick.created.len());
        }
        let finished = tick.rendezvous.completed.len() + tick.loitering.completed.len();
        if finished > 0 {
            debug!("Monitor: {} detections completed", finished);
        }
        self.update(UpdateKind::Activity, now, vessels.len())
    }

    fn cleanup(&mut self) {
        let report = self.orchestrator.cleanup(
            self.schedule.cleanup_max_age,
            self.schedule.collision_grace,
            now_millis(),
        );
        debug!("Monitor: cleanup {:?}", report);
    }

    fn update(&self, kind: UpdateKind, now: u64, vessel_count: usize) -> MonitorUpdate {
        let lifecycle = self.orchestrator.lifecycle();
        MonitorUpdate {
            kind,
            timestamp: now,
            vessel_count,
            collision_alerts: self.orchestrator.collision().active_alerts(),
            rendezvous_events: self.orchestrator.rendezvous().active_events(),
            loitering_events: self.orchestrator.loitering().active_events(),
            completed_rendezvous: self.orchestrator.rendezvous().completed_events().to_vec(),
            completed_loitering: self.orchestrator.loitering().completed_events().to_vec(),
            activities: lifecycle.active(),
            pending: lifecycle.pending(),
            statistics: lifecycle.statistics(),
        }
    }

    fn publish(&self, update: MonitorUpdate) {
        // No subscribers is not an error
        let _ = self.tx_update.send(update);
    }

    fn handle(&mut self, command: MonitorCommand) {
        let command = match command {
            MonitorCommand::Tick { reply } => {
                let update = self.activity_tick();
                self.publish(update.clone());
                if reply.send(update).is_err() {
                    warn!("Monitor: requester went away before the reply");
                }
                return;
            }
            command => command,
        };

        let now = now_millis();
        let lifecycle = self.orchestrator.lifecycle_mut();
        let delivered = match command {
            MonitorCommand::Acknowledge { id, user, reply } => {
                reply.send(lifecycle.acknowledge(&id, &user, now)).is_ok()
            }
            MonitorCommand::Investigate { id, user, reply } => {
                reply.send(lifecycle.investigate(&id, &user, now)).is_ok()
            }
            MonitorCommand::Resolve {
                id,
                user,
                resolution,
                reply,
            } => reply
                .send(lifecycle.resolve(&id, &user, &resolution, now))
                .is_ok(),
            MonitorCommand::FalsePositive {
                id,
                user,
                reason,
                reply,
            } => reply
                .send(lifecycle.mark_false_positive(&id, &user, &reason, now))
                .is_ok(),
            MonitorCommand::Escalate {
                id,
                user,
                target,
                reason,
                reply,
            } => reply
                .send(lifecycle.escalate(&id, &user, &target, &reason, now))
                .is_ok(),
            MonitorCommand::AddNote {
                id,
                user,
                text,
                reply,
            } => reply.send(lifecycle.add_note(&id, &user, &text, now)).is_ok(),
            MonitorCommand::CreateOther {
                severity,
                vessels,
                location,
                description,
                metrics,
                reply,
            } => reply
                .send(lifecycle.create_other(severity, vessels, location, &description, metrics, now))
                .is_ok(),
            MonitorCommand::Activity { id, reply } => {
                reply.send(lifecycle.get(&id).cloned()).is_ok()
            }
            MonitorCommand::Activities { filter, reply } => {
                let activities = match filter {
                    ActivityFilter::All => lifecycle.all(),
                    ActivityFilter::Pending => lifecycle.pending(),
                    ActivityFilter::Active => lifecycle.active(),
                    ActivityFilter::Vessel(id) => lifecycle.by_vessel(id),
                    ActivityFilter::Type(t) => lifecycle.by_type(t),
                };
                reply.send(activities).is_ok()
            }
            MonitorCommand::History { id, reply } => {
                reply.send(lifecycle.history(&id).to_vec()).is_ok()
            }
            MonitorCommand::Statistics { reply } => reply.send(lifecycle.statistics()).is_ok(),
            MonitorCommand::Tick { .. } => true,
        };
        if !delivered {
            warn!("Monitor: requester went away before the reply");
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.001))
}

/// Run a monitor as a `tokio-graceful-shutdown` subsystem
pub async fn run_monitor<S: VesselSource + Send + 'static>(
    subsys: SubsystemHandle,
    service: MonitorService<S>,
    handle: MonitorHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let task = service.run();
    tokio::pin!(task);

    tokio::select! {
        result = &mut task => result,
        _ = subsys.on_shutdown_requested() => {
            handle.stop();
            task.await
        }
    }
}
