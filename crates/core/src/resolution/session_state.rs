use std::collections::{BTreeMap, HashMap};

use crate::gallery::domain::identity::{HumanIdentity, TrackId};

/// Per-scan bookkeeping: which tracker id belongs to which identity, which
/// identities have appeared, and how healthy the gallery backend has been.
///
/// Owned by exactly one scan and dropped with it. Never shared across
/// videos because tracker ids are meaningless outside their own video.
#[derive(Debug, Default)]
pub struct SessionState {
    track_to_identity: HashMap<TrackId, HumanIdentity>,
    tracks_per_identity: BTreeMap<HumanIdentity, usize>,
    frame_counter: usize,
    store_failures: usize,
    consecutive_store_failures: usize,
    degraded_after: usize,
    degraded: bool,
}

impl SessionState {
    /// `degraded_after` consecutive store failures flip the session into
    /// degraded mode; `0` disables the signal.
    pub fn new(degraded_after: usize) -> Self {
        Self {
            degraded_after,
            ..Self::default()
        }
    }

    pub fn identity_of(&self, track: TrackId) -> Option<&HumanIdentity> {
        self.track_to_identity.get(&track)
    }

    /// Binds `track` to `identity` unless it is already bound, and records
    /// the identity as seen. Returns the identity the track ends up bound to.
    pub fn bind(&mut self, track: TrackId, identity: HumanIdentity) -> HumanIdentity {
        if let Some(bound) = self.track_to_identity.get(&track) {
            return bound.clone();
        }
        *self.tracks_per_identity.entry(identity.clone()).or_insert(0) += 1;
        self.track_to_identity.insert(track, identity.clone());
        identity
    }

    /// Identities seen so far, each with the number of tracker ids that
    /// resolved to it.
    pub fn tracks_per_identity(&self) -> &BTreeMap<HumanIdentity, usize> {
        &self.tracks_per_identity
    }

    /// Advances the frame counter, returning the index of the frame just
    /// started (0-based).
    pub fn begin_frame(&mut self) -> usize {
        let current = self.frame_counter;
        self.frame_counter += 1;
        current
    }

    pub fn frames_started(&self) -> usize {
        self.frame_counter
    }

    pub fn record_store_success(&mut self) {
        self.consecutive_store_failures = 0;
    }

    pub fn record_store_failure(&mut self) {
        self.store_failures += 1;
        self.consecutive_store_failures += 1;
        if self.degraded_after > 0
            && !self.degraded
            && self.consecutive_store_failures >= self.degraded_after
        {
            log::warn!(
                "Gallery store failed {} times in a row; identities may be \
                 over-minted for the rest of this scan",
                self.consecutive_store_failures
            );
            self.degraded = true;
        }
    }

    pub fn store_failures(&self) -> usize {
        self.store_failures
    }

    /// Sticky for the rest of the session once set.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}
