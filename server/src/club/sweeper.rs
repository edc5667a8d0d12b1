use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::db::queries::sessions::DeadlineField;

use super::engine::ClubEngine;

/// The three deadline passes a sweep tick runs, in lifecycle order so a
/// session created long ago can move through several phases across
/// consecutive ticks.
const SWEEP_PASSES: [DeadlineField; 3] =
    [DeadlineField::Join, DeadlineField::Poll, DeadlineField::End];

/// Periodic reconciliation task. Reads the durable store (the cross-restart
/// ground truth) for sessions past a deadline and drives them through the
/// engine's single transition path, rehydrating the in-memory registry as a
/// side effect. Deadlines are evaluated lazily: a transition may lag its
/// nominal instant by up to one sweep period.
pub struct DeadlineSweeper {
    engine: Arc<ClubEngine>,
    period: Duration,
}

impl DeadlineSweeper {
    pub fn new(engine: Arc<ClubEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Run the sweep loop forever on its own task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// One full sweep over all three deadline kinds. A failing guild is
    /// logged and left for the next tick; it never blocks the others.
    pub async fn sweep_once(&self) {
        for field in SWEEP_PASSES {
            if let Err(e) = self.sweep_field(field).await {
                error!(?field, error = %e, "deadline sweep pass failed");
            }
        }
    }

    async fn sweep_field(&self, field: DeadlineField) -> Result<(), sqlx::Error> {
        let now = self.engine.now();
        let due = self.engine.repository().elapsed(field, now).await?;
        for row in due {
            match self.engine.advance(&row.guild_id, field).await {
                Ok(outcome) => {
                    debug!(guild_id = %row.guild_id, ?field, ?outcome, "sweep advanced session");
                }
                Err(e) => {
                    warn!(
                        guild_id = %row.guild_id,
                        ?field,
                        error = %e,
                        "sweep failed to advance session, will retry next tick"
                    );
                }
            }
        }
        Ok(())
    }
}
