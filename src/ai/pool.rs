//! Client Pool Manager
//!
//! Bounded set of upstream clients, each with a concurrency capacity.
//! [`ClientPool::acquire`] reserves a slot on the next client with room, in
//! round-robin order, and fails fast with [`PipelineError::NoCapacity`] when
//! every client is full. It never blocks.
//!
//! A reservation is held by a [`ClientLease`]; dropping the lease (or calling
//! [`ClientLease::release`]) frees the slot exactly once.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::provider::{ProviderConfig, SharedProvider, create_provider};
use crate::config::Config;
use crate::types::{PipelineError, Result};

/// One upstream client with its concurrency accounting
pub struct PooledClient {
    identity: String,
    capacity: AtomicU32,
    usage: AtomicU32,
    provider: SharedProvider,
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("identity", &self.identity)
            .field("capacity", &self.capacity())
            .field("usage", &self.usage())
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl PooledClient {
    pub fn new(identity: impl Into<String>, capacity: u32, provider: SharedProvider) -> Self {
        Self {
            identity: identity.into(),
            capacity: AtomicU32::new(capacity),
            usage: AtomicU32::new(0),
            provider,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn usage(&self) -> u32 {
        self.usage.load(Ordering::Acquire)
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    /// Reserve a slot if `usage < capacity`
    fn try_reserve(&self) -> bool {
        let mut current = self.usage.load(Ordering::Acquire);
        loop {
            if current >= self.capacity() {
                return false;
            }
            match self.usage.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release_slot(&self) {
        let result = self
            .usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            warn!(client = %self.identity, "Released a slot on an idle client");
        }
    }
}

/// Reserved slot on a pooled client
///
/// Releases exactly once, on [`release`](Self::release) or on drop.
#[derive(Debug)]
pub struct ClientLease {
    client: Arc<PooledClient>,
    released: AtomicBool,
}

impl ClientLease {
    fn new(client: Arc<PooledClient>) -> Self {
        Self {
            client,
            released: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &str {
        self.client.identity()
    }

    pub fn provider(&self) -> &SharedProvider {
        self.client.provider()
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.client.release_slot();
            debug!(client = %self.client.identity, "Released client slot");
        }
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Operator view of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientUsage {
    pub identity: String,
    pub capacity: u32,
    pub usage: u32,
}

/// Round-robin pool of upstream clients
#[derive(Debug, Default)]
pub struct ClientPool {
    clients: RwLock<Arc<Vec<Arc<PooledClient>>>>,
    cursor: AtomicUsize,
}

impl ClientPool {
    pub fn new(clients: Vec<PooledClient>) -> Self {
        Self {
            clients: RwLock::new(Arc::new(clients.into_iter().map(Arc::new).collect())),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Build one client per configured credential
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients = Vec::new();

        for entry in config.pool.effective_clients() {
            let api_key = match &entry.api_key_env {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    PipelineError::Config(format!(
                        "Environment variable {} for client '{}' is not set",
                        var, entry.identity
                    ))
                })?),
                None => None,
            };

            let provider_config = ProviderConfig {
                provider: config.llm.provider.clone(),
                model: Some(config.llm.model.clone()),
                timeout_secs: config.llm.timeout_secs,
                temperature: config.llm.temperature,
                api_key,
                api_base: entry.api_base.clone().or_else(|| config.llm.api_base.clone()),
                max_tokens: config.llm.max_tokens,
            };

            let provider = create_provider(&provider_config)?;
            clients.push(PooledClient::new(&entry.identity, entry.capacity, provider));
        }

        info!(clients = clients.len(), "Client pool configured");
        Ok(Self::new(clients))
    }

    fn current(&self) -> Arc<Vec<Arc<PooledClient>>> {
        let guard = self.clients.read().unwrap_or_else(|poisoned| {
            tracing::error!("Client pool RwLock poisoned on read, recovering");
            poisoned.into_inner()
        });
        Arc::clone(&guard)
    }

    /// Reserve a slot on the first client with spare capacity
    pub fn acquire(&self) -> Result<ClientLease> {
        let clients = self.current();
        let count = clients.len();
        if count == 0 {
            return Err(PipelineError::NoCapacity { clients: 0 });
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        for offset in 0..count {
            let client = &clients[(start + offset) % count];
            if client.try_reserve() {
                debug!(
                    client = %client.identity,
                    usage = client.usage(),
                    capacity = client.capacity(),
                    "Reserved client slot"
                );
                return Ok(ClientLease::new(Arc::clone(client)));
            }
        }

        Err(PipelineError::NoCapacity { clients: count })
    }

    /// Replace the client list.
    ///
    /// A client whose identity is already present keeps its usage counter and
    /// provider and takes the new capacity; slots leased above a lowered
    /// capacity drain before new reservations succeed. Removed clients stay
    /// alive until their last lease is released.
    pub fn reconfigure(&self, clients: Vec<PooledClient>) {
        let existing = self.current();

        let next: Vec<Arc<PooledClient>> = clients
            .into_iter()
            .map(|incoming| {
                match existing.iter().find(|c| c.identity == incoming.identity) {
                    Some(client) => {
                        client
                            .capacity
                            .store(incoming.capacity(), Ordering::Release);
                        Arc::clone(client)
                    }
                    None => Arc::new(incoming),
                }
            })
            .collect();

        info!(
            previous = existing.len(),
            clients = next.len(),
            "Client pool reconfigured"
        );

        let mut guard = self.clients.write().unwrap_or_else(|poisoned| {
            tracing::error!("Client pool RwLock poisoned on write, recovering");
            poisoned.into_inner()
        });
        *guard = Arc::new(next);
    }

    pub fn snapshot(&self) -> Vec<ClientUsage> {
        self.current()
            .iter()
            .map(|c| ClientUsage {
                identity: c.identity.clone(),
                capacity: c.capacity(),
                usage: c.usage(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
