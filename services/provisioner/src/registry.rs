//! CI node registry seam.
//!
//! The CI server owns the authoritative list of agents. The provisioner only
//! needs to register and remove records, mint connection secrets and wait
//! for an agent to come online; [`InMemoryRegistry`] implements that for
//! tests and for standalone operation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::RegistryError;

#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Add an agent record.
    async fn register(&self, agent: Arc<Agent>) -> Result<(), RegistryError>;

    /// Look up an agent by name.
    async fn get(&self, name: &str) -> Option<Arc<Agent>>;

    /// Secret the named agent presents when connecting.
    fn agent_secret(&self, name: &str) -> String;

    /// Resolve once the named agent is online.
    async fn wait_until_online(&self, name: &str) -> Result<(), RegistryError>;

    /// Remove an agent record.
    async fn remove(&self, name: &str) -> Result<(), RegistryError>;
}

struct Entry {
    agent: Arc<Agent>,
    online: watch::Sender<bool>,
}

/// Registry kept in process memory.
pub struct InMemoryRegistry {
    secret_key: String,
    agents: RwLock<HashMap<String, Entry>>,
}

impl InMemoryRegistry {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Mark an agent as connected. Returns false if it is not registered.
    pub async fn connect(&self, name: &str) -> bool {
        let agents = self.agents.read().await;
        let Some(entry) = agents.get(name) else {
            return false;
        };
        entry.agent.mark_connected(Utc::now());
        entry.online.send_replace(true);
        info!(agent = %name, "Agent connected");
        true
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

#[async_trait]
impl NodeRegistry for InMemoryRegistry {
    async fn register(&self, agent: Arc<Agent>) -> Result<(), RegistryError> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(agent.name()) {
            return Err(RegistryError::Duplicate(agent.name().to_string()));
        }
        debug!(agent = %agent.name(), "Registering agent");
        let (online, _) = watch::channel(false);
        agents.insert(agent.name().to_string(), Entry { agent, online });
        Ok(())
    }

    async fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.read().await.get(name).map(|e| e.agent.clone())
    }

    fn agent_secret(&self, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret_key.as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn wait_until_online(&self, name: &str) -> Result<(), RegistryError> {
        let mut online = {
            let agents = self.agents.read().await;
            agents
                .get(name)
                .map(|e| e.online.subscribe())
                .ok_or_else(|| RegistryError::UnknownAgent(name.to_string()))?
        };

        online
            .wait_for(|up| *up)
            .await
            .map(|_| ())
            .map_err(|_| RegistryError::Removed(name.to_string()))
    }

    async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        match self.agents.write().await.remove(name) {
            Some(_) => {
                debug!(agent = %name, "Removed agent");
                Ok(())
            }
            None => Err(RegistryError::UnknownAgent(name.to_string())),
        }
    }
}
