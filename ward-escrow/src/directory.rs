//! Process-wide registry of escrow authorities.

use crate::authority::EscrowAuthority;
use crate::error::{EscrowError, EscrowResult};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, info};
use ward_types::AuthorityId;

/// Append-only, read-mostly directory of escrow authorities.
///
/// Writes happen only at registration and deactivation. A `BTreeMap` keyed
/// by authority id gives [`EscrowDirectory::active_authorities`] its
/// deterministic ordering, which in turn fixes shard ordering in containers
/// so independent builds of the same chunk are comparable.
pub struct EscrowDirectory {
    inner: RwLock<BTreeMap<AuthorityId, EscrowAuthority>>,
}

impl EscrowDirectory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a new authority. Ids are permanent: re-registering an
    /// existing id fails rather than overwriting key material.
    pub fn register(&self, authority: EscrowAuthority) -> EscrowResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| EscrowError::Directory(e.to_string()))?;

        if map.contains_key(&authority.id) {
            return Err(EscrowError::DuplicateAuthority(authority.id));
        }
        info!(authority = %authority.id, weight = authority.weight, "registered escrow authority");
        map.insert(authority.id.clone(), authority);
        Ok(())
    }

    /// Looks up an authority by id.
    pub fn resolve(&self, id: &AuthorityId) -> EscrowResult<EscrowAuthority> {
        let map = self
            .inner
            .read()
            .map_err(|e| EscrowError::Directory(e.to_string()))?;
        map.get(id)
            .cloned()
            .ok_or_else(|| EscrowError::UnknownAuthority(id.clone()))
    }

    /// Flags an authority inactive. Affects future sessions only; shard
    /// records in existing containers stay resolvable through
    /// [`EscrowDirectory::resolve`].
    pub fn deactivate(&self, id: &AuthorityId) -> EscrowResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| EscrowError::Directory(e.to_string()))?;
        let authority = map
            .get_mut(id)
            .ok_or_else(|| EscrowError::UnknownAuthority(id.clone()))?;
        authority.active = false;
        debug!(authority = %id, "deactivated escrow authority");
        Ok(())
    }

    /// Active authorities in deterministic id order.
    pub fn active_authorities(&self) -> EscrowResult<Vec<EscrowAuthority>> {
        let map = self
            .inner
            .read()
            .map_err(|e| EscrowError::Directory(e.to_string()))?;
        Ok(map.values().filter(|a| a.active).cloned().collect())
    }

    /// All authorities, active or not, in id order.
    pub fn all_authorities(&self) -> EscrowResult<Vec<EscrowAuthority>> {
        let map = self
            .inner
            .read()
            .map_err(|e| EscrowError::Directory(e.to_string()))?;
        Ok(map.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EscrowDirectory {
    fn default() -> Self {
        Self::new()
    }
}
