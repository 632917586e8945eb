//! In-memory registry of live wizard sessions, with idle expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::controller::{WizardController, WizardDeps};

pub struct SessionRegistry {
    deps: WizardDeps,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<Uuid, Arc<WizardController>>>,
}

impl SessionRegistry {
    pub fn new(deps: WizardDeps, idle_timeout: Duration) -> Self {
        Self {
            deps,
            idle_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session at the first step.
    pub async fn create(&self) -> Arc<WizardController> {
        let controller = Arc::new(WizardController::new(self.deps.clone()));
        self.sessions
            .write()
            .await
            .insert(controller.id(), Arc::clone(&controller));
        info!(session_id = %controller.id(), "Wizard session created");
        controller
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<WizardController>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            debug!(session_id = %id, "Wizard session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle for longer than the timeout. Sessions with a
    /// gate call in flight are kept. Returns the number removed.
    pub async fn expire_idle(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.idle_timeout)
            .map(|idle| Utc::now() - idle)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let snapshot: Vec<(Uuid, Arc<WizardController>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, c)| (*id, Arc::clone(c)))
            .collect();

        let mut stale = Vec::new();
        for (id, controller) in snapshot {
            if !controller.is_pending().await && controller.last_active().await < cutoff {
                stale.push(id);
            }
        }

        if stale.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        for id in &stale {
            sessions.remove(id);
        }
        info!(count = stale.len(), "Expired idle wizard sessions");
        stale.len()
    }
}

/// Spawn a background task that expires idle sessions every minute.
pub fn spawn_expiry_task(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            registry.expire_idle().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::enrich::DisabledEnricher;
    use crate::error::GateError;
    use crate::otp::VerificationGate;
    use crate::store::LibSqlBackend;
    use crate::wizard::validators::FieldRules;

    struct NoopGate;

    #[async_trait]
    impl VerificationGate for NoopGate {
        async fn send_code(&self, _email: &str) -> Result<(), GateError> {
            Ok(())
        }

        async fn verify_code(&self, _email: &str, _code: &str) -> Result<(), GateError> {
            Ok(())
        }
    }

    async fn registry(idle: Duration) -> SessionRegistry {
        let deps = WizardDeps {
            rules: Arc::new(FieldRules::default()),
            gate: Arc::new(NoopGate),
            enricher: Arc::new(DisabledEnricher),
            store: Arc::new(LibSqlBackend::new_memory().await.unwrap()),
        };
        SessionRegistry::new(deps, idle)
    }

    #[tokio::test]
    async fn create_get_remove() {
        let reg = registry(Duration::from_secs(60)).await;
        assert!(reg.is_empty().await);

        let a = reg.create().await;
        let b = reg.create().await;
        assert_ne!(a.id(), b.id());
        assert_eq!(reg.len().await, 2);
        assert!(Arc::ptr_eq(&reg.get(a.id()).await.unwrap(), &a));

        assert!(reg.remove(a.id()).await);
        assert!(!reg.remove(a.id()).await);
        assert!(reg.get(a.id()).await.is_none());
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let reg = registry(Duration::from_secs(60)).await;
        let a = reg.create().await;
        let b = reg.create().await;
        a.update_field(crate::wizard::fields::FieldName::FirstName, "Ada")
            .await;
        assert!(b.fields().await.is_blank(crate::wizard::fields::FieldName::FirstName));
    }

    #[tokio::test]
    async fn expire_idle_removes_stale_sessions() {
        let reg = registry(Duration::ZERO).await;
        reg.create().await;
        reg.create().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(reg.expire_idle().await, 2);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn expire_idle_keeps_active_sessions() {
        let reg = registry(Duration::from_secs(3600)).await;
        reg.create().await;
        assert_eq!(reg.expire_idle().await, 0);
        assert_eq!(reg.len().await, 1);
    }
}
