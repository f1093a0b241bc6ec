use crate::kinds::Kind;
use crate::protocol::Snapshot;
use crate::types::ParamValue;
use crate::values;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of comparing an incoming snapshot with the published one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dirty {
    /// Some non-level field differs
    pub parameter: bool,
    /// Some level slot differs under the quiet-floor rule
    pub level: bool,
    /// Changed mask over the kind's input level slots
    pub inputs: Vec<bool>,
    /// Changed mask over the kind's output level slots
    pub outputs: Vec<bool>,
}

impl Dirty {
    pub fn any(&self) -> bool {
        self.parameter || self.level
    }
}

/// Which level slots moved in the most recent level-dirty snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelMasks {
    pub inputs: Vec<bool>,
    pub outputs: Vec<bool>,
}

/// Canonical remote state plus the write-ahead cache
///
/// Only the receiver loop replaces the snapshot. Readers clone the `Arc`
/// and keep a consistent view even while a newer snapshot is swapped in.
pub struct StateStore {
    kind: Kind,
    snapshot: RwLock<Arc<Snapshot>>,
    cache: Mutex<HashMap<String, ParamValue>>,
    level_masks: RwLock<LevelMasks>,
    pdirty: AtomicBool,
    ldirty: AtomicBool,
}

impl StateStore {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            cache: Mutex::new(HashMap::new()),
            level_masks: RwLock::new(LevelMasks {
                inputs: vec![false; kind.num_strip_levels()],
                outputs: vec![false; kind.num_bus_levels()],
            }),
            pdirty: AtomicBool::new(false),
            ldirty: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Current canonical snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Swap in a new canonical snapshot; the old one is never touched
    pub(crate) fn replace_snapshot(&self, snapshot: Arc<Snapshot>) {
        *self.snapshot.write() = snapshot;
    }

    /// Compare `incoming` against the published snapshot
    pub fn compare(&self, incoming: &Snapshot) -> Dirty {
        let current = self.snapshot();
        let strip_slots = self.kind.num_strip_levels();
        let bus_slots = self.kind.num_bus_levels();
        let (inputs, inputs_changed) = values::level_changes(
            &current.input_levels[..strip_slots],
            &incoming.input_levels[..strip_slots],
        );
        let (outputs, outputs_changed) = values::level_changes(
            &current.output_levels[..bus_slots],
            &incoming.output_levels[..bus_slots],
        );
        Dirty {
            parameter: incoming.pdirty(&current),
            level: inputs_changed || outputs_changed,
            inputs,
            outputs,
        }
    }

    /// Record one receiver iteration: flags always, snapshot and masks when dirty
    pub(crate) fn publish(&self, incoming: Snapshot, dirty: Dirty) {
        self.pdirty.store(dirty.parameter, Ordering::Release);
        self.ldirty.store(dirty.level, Ordering::Release);
        if dirty.level {
            *self.level_masks.write() = LevelMasks {
                inputs: dirty.inputs,
                outputs: dirty.outputs,
            };
        }
        if dirty.parameter || dirty.level {
            self.replace_snapshot(Arc::new(incoming));
        }
    }

    /// True iff the latest receiver iteration saw a parameter change
    pub fn pdirty(&self) -> bool {
        self.pdirty.load(Ordering::Acquire)
    }

    /// True iff the latest receiver iteration saw a level change
    pub fn ldirty(&self) -> bool {
        self.ldirty.load(Ordering::Acquire)
    }

    pub fn level_masks(&self) -> LevelMasks {
        self.level_masks.read().clone()
    }

    // ========== Write-ahead cache ==========

    /// Remember a value this client just sent
    ///
    /// Parameter names are case-insensitive on the wire, so keys are stored
    /// in lowercase.
    pub fn cache(&self, identifier: impl Into<String>, value: ParamValue) {
        let mut key = identifier.into();
        key.make_ascii_lowercase();
        self.cache.lock().insert(key, value);
    }

    /// Pop a pending cached value (read-once)
    pub fn take_cached(&self, identifier: &str) -> Option<ParamValue> {
        self.cache.lock().remove(&identifier.to_ascii_lowercase())
    }

    /// Read a parameter: a pending cache entry wins once, otherwise derive
    /// the value from the canonical snapshot.
    pub fn read<T>(
        &self,
        identifier: &str,
        from_cache: impl FnOnce(ParamValue) -> Option<T>,
        derive: impl FnOnce(&Snapshot) -> T,
    ) -> T {
        if let Some(value) = self.take_cached(identifier).and_then(from_cache) {
            tracing::trace!("{} served from write-ahead cache", identifier);
            return value;
        }
        derive(&self.snapshot())
    }

    pub fn pending_writes(&self) -> usize {
        self.cache.lock().len()
    }
}
