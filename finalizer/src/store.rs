use crate::error::Result;
use std::collections::{BTreeSet, HashMap};

/// Secret nonces keyed by raffle id, held between commit and reveal.
pub trait NonceStore {
    fn get(&self, raffle_id: u64) -> Result<Option<u64>>;
    fn insert(&mut self, raffle_id: u64, nonce: u64) -> Result<()>;
    fn remove(&mut self, raffle_id: u64) -> Result<()>;
}

/// Lost on restart; a reveal after restart falls back to emergency selection.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    nonces: HashMap<u64, u64>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl NonceStore for MemoryNonceStore {
    fn get(&self, raffle_id: u64) -> Result<Option<u64>> {
        Ok(self.nonces.get(&raffle_id).copied())
    }

    fn insert(&mut self, raffle_id: u64, nonce: u64) -> Result<()> {
        self.nonces.insert(raffle_id, nonce);
        Ok(())
    }

    fn remove(&mut self, raffle_id: u64) -> Result<()> {
        self.nonces.remove(&raffle_id);
        Ok(())
    }
}

/// Raffle ids whose winner selection was confirmed this session.
#[derive(Debug, Default, Clone)]
pub struct ProcessedCache {
    ids: BTreeSet<u64>,
}

impl ProcessedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raffle_id: u64) -> bool {
        self.ids.insert(raffle_id)
    }

    pub fn contains(&self, raffle_id: u64) -> bool {
        self.ids.contains(&raffle_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }

    /// Drop the lowest ids until at most `limit` remain. Returns how many went.
    pub fn evict_to(&mut self, limit: usize) -> usize {
        let excess = self.ids.len().saturating_sub(limit);
        if excess == 0 {
            return 0;
        }
        match self.ids.iter().nth(excess).copied() {
            Some(lowest_kept) => self.ids = self.ids.split_off(&lowest_kept),
            None => self.ids.clear(),
        }
        excess
    }
}
