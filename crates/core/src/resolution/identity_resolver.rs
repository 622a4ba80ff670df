use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::gallery::domain::diversity_selector::{DiversitySelector, SelectionError};
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::gallery_store::{GalleryStore, StoreError};
use crate::gallery::domain::identity::{EntryId, HumanIdentity, TrackId};
use crate::resolution::session_state::SessionState;
use crate::shared::frame::Frame;
use crate::shared::validation::ValidationError;

/// How an observation was attributed to an identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The track was already bound earlier in the session.
    Cached(HumanIdentity),
    /// Nearest gallery entry was strictly closer than the match threshold.
    Matched {
        identity: HumanIdentity,
        distance: f64,
    },
    /// No close enough entry existed; a new identity was created with this
    /// observation as its first gallery entry.
    Minted(HumanIdentity),
}

impl Resolution {
    pub fn identity(&self) -> &HumanIdentity {
        match self {
            Resolution::Cached(identity)
            | Resolution::Matched { identity, .. }
            | Resolution::Minted(identity) => identity,
        }
    }

    pub fn is_minted(&self) -> bool {
        matches!(self, Resolution::Minted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Gallery was below its cap; the observation was appended.
    Grown(EntryId),
    /// Gallery was full; the least diverse entries were swapped out.
    Replaced {
        admitted: Option<EntryId>,
        evicted: Vec<EntryId>,
    },
    /// The observation added no diversity and was dropped.
    Unchanged,
}

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

impl RefreshError {
    pub fn is_fatal(&self) -> bool {
        match self {
            RefreshError::Store(e) => e.is_fatal(),
            RefreshError::Selection(_) => false,
        }
    }
}

/// Maps tracker ids to persistent identities and keeps each identity's
/// gallery bounded.
///
/// One resolver is shared (behind `Arc`) by every scan that writes to the
/// same store: the per-identity locks that serialize gallery refreshes live
/// here, so two resolvers over one store would not exclude each other.
pub struct IdentityResolver {
    store: Arc<dyn GalleryStore>,
    selector: Box<dyn DiversitySelector>,
    match_threshold: f64,
    gallery_cap: usize,
    identity_locks: Mutex<HashMap<HumanIdentity, Arc<Mutex<()>>>>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        selector: Box<dyn DiversitySelector>,
        match_threshold: f64,
        gallery_cap: usize,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=2.0).contains(&match_threshold) {
            return Err(ValidationError::InvalidThreshold(match_threshold));
        }
        if gallery_cap == 0 {
            return Err(ValidationError::InvalidCap);
        }
        Ok(Self {
            store,
            selector,
            match_threshold,
            gallery_cap,
            identity_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn GalleryStore> {
        &self.store
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn gallery_cap(&self) -> usize {
        self.gallery_cap
    }

    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Attributes one observation of `track` to an identity.
    ///
    /// A track already bound in `session` short-circuits without touching
    /// the store. On error nothing is bound, so a later observation of the
    /// same track gets a fresh attempt.
    pub fn resolve(
        &self,
        session: &mut SessionState,
        track: TrackId,
        crop: &Frame,
        embedding: &Embedding,
    ) -> Result<Resolution, StoreError> {
        if let Some(identity) = session.identity_of(track) {
            return Ok(Resolution::Cached(identity.clone()));
        }

        let nearest = self.store.query_nearest(embedding, 1)?;
        if let Some(hit) = nearest.into_iter().next() {
            if hit.distance < self.match_threshold {
                log::debug!(
                    "Track {track} matched {} at distance {:.4}",
                    hit.identity,
                    hit.distance
                );
                let identity = session.bind(track, hit.identity);
                return Ok(Resolution::Matched {
                    identity,
                    distance: hit.distance,
                });
            }
        }

        let identity = HumanIdentity::mint();
        self.store.insert(&identity, embedding.clone(), crop)?;
        log::info!("Track {track} minted new identity {identity}");
        let identity = session.bind(track, identity);
        Ok(Resolution::Minted(identity))
    }

    /// Offers a fresh observation to `identity`'s gallery.
    ///
    /// Below the cap the observation is appended. At the cap the current
    /// entries plus the newcomer go through the diversity selector and the
    /// losers are swapped out in one store transaction. The whole
    /// read-select-write sequence holds the identity's lock.
    pub fn refresh_if_novel(
        &self,
        identity: &HumanIdentity,
        crop: &Frame,
        embedding: &Embedding,
    ) -> Result<RefreshOutcome, RefreshError> {
        let lock = self.lock_for(identity)?;
        let outcome = {
            // The mutex guards no data, so a poisoned lock is still usable.
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.refresh_locked(identity, crop, embedding)
        };
        self.release_lock(identity, lock);
        outcome
    }

    fn refresh_locked(
        &self,
        identity: &HumanIdentity,
        crop: &Frame,
        embedding: &Embedding,
    ) -> Result<RefreshOutcome, RefreshError> {
        let entries = self.store.get_all(identity)?;
        if entries.len() < self.gallery_cap {
            let id = self.store.insert(identity, embedding.clone(), crop)?;
            log::debug!(
                "Gallery of {identity} grew to {} entries",
                entries.len() + 1
            );
            return Ok(RefreshOutcome::Grown(id));
        }

        let candidates: Vec<Embedding> = entries
            .iter()
            .map(|entry| entry.embedding.clone())
            .chain(std::iter::once(embedding.clone()))
            .collect();
        let keep = self.selector.select(&candidates, self.gallery_cap)?;

        let newcomer = entries.len();
        let admit = keep.contains(&newcomer);
        let evicted: Vec<EntryId> = entries
            .iter()
            .enumerate()
            .filter(|(idx, _)| !keep.contains(idx))
            .map(|(_, entry)| entry.id)
            .collect();

        if evicted.is_empty() && !admit {
            log::trace!("Observation of {identity} adds no diversity");
            return Ok(RefreshOutcome::Unchanged);
        }

        let admitted = self.store.replace(
            identity,
            &evicted,
            admit.then(|| (embedding.clone(), crop)),
        )?;
        log::debug!(
            "Gallery of {identity}: evicted {evicted:?}, admitted {admitted:?}"
        );
        Ok(RefreshOutcome::Replaced { admitted, evicted })
    }

    fn lock_for(&self, identity: &HumanIdentity) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self
            .identity_locks
            .lock()
            .map_err(|_| StoreError::Inconsistent("identity lock table poisoned".into()))?;
        Ok(locks.entry(identity.clone()).or_default().clone())
    }

    /// Drops the table entry once no other refresh holds or awaits it.
    fn release_lock(&self, identity: &HumanIdentity, lock: Arc<Mutex<()>>) {
        drop(lock);
        let Ok(mut locks) = self.identity_locks.lock() else {
            return;
        };
        if locks
            .get(identity)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(identity);
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.identity_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
