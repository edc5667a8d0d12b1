use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::repository::SessionRepository;
use super::session::SessionState;

/// In-memory map of guild -> active session, the single source of truth
/// for per-event decisions once loaded. Each entry sits behind its own
/// async mutex: that lock is the per-guild critical section, held across
/// the durable write so registry and store mutate in step.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// The session handle for a guild, if the registry has it loaded.
    pub fn get(&self, guild_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.get(guild_id).map(|entry| entry.value().clone())
    }

    /// Insert a freshly created session. Returns the shared handle.
    pub fn insert(&self, state: SessionState) -> Arc<Mutex<SessionState>> {
        let guild_id = state.guild_id.clone();
        let handle = Arc::new(Mutex::new(state));
        self.sessions.insert(guild_id, handle.clone());
        handle
    }

    /// Drop a guild's entry (session closed).
    pub fn remove(&self, guild_id: &str) {
        self.sessions.remove(guild_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The session handle for a guild, hydrating from the repository when
    /// the registry does not hold it yet (lazy load after a restart).
    /// When two tasks race to hydrate, the first insert wins and both get
    /// the same handle.
    pub async fn get_or_load(
        &self,
        repo: &SessionRepository,
        guild_id: &str,
    ) -> Result<Option<Arc<Mutex<SessionState>>>, sqlx::Error> {
        if let Some(handle) = self.get(guild_id) {
            return Ok(Some(handle));
        }

        let Some(state) = repo.load(guild_id).await? else {
            return Ok(None);
        };

        let entry = self
            .sessions
            .entry(guild_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)));
        Ok(Some(entry.value().clone()))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::sessions::CreateSessionParams;
    use chrono::{TimeZone, Utc};

    async fn setup_repo() -> SessionRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SessionRepository::new(pool)
    }

    async fn seed_session(repo: &SessionRepository, guild: &str) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        repo.create(&CreateSessionParams {
            guild_id: guild,
            title: "Winter Reading",
            description: "",
            start_time: start,
            end_time: start + chrono::Duration::days(14),
            join_deadline: start + chrono::Duration::days(3),
            voting_enabled: true,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_or_load_hydrates_once() {
        let repo = setup_repo().await;
        seed_session(&repo, "g1").await;

        let registry = SessionRegistry::new();
        assert!(registry.get("g1").is_none());

        let first = registry.get_or_load(&repo, "g1").await.unwrap().unwrap();
        let second = registry.get_or_load(&repo, "g1").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second), "both callers share one handle");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_load_unknown_guild() {
        let repo = setup_repo().await;
        let registry = SessionRegistry::new();
        assert!(registry.get_or_load(&repo, "nosuch").await.unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_forgets_guild() {
        let repo = setup_repo().await;
        seed_session(&repo, "g1").await;

        let registry = SessionRegistry::new();
        registry.get_or_load(&repo, "g1").await.unwrap().unwrap();
        registry.remove("g1");
        assert!(registry.get("g1").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_hydration_converges() {
        let repo = setup_repo().await;
        seed_session(&repo, "g1").await;

        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_load(&repo, "g1").await.unwrap().unwrap()
            }));
        }

        let mut loaded = Vec::new();
        for h in handles {
            loaded.push(h.await.unwrap());
        }
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
