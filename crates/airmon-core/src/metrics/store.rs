//! Bounded, label-keyed sample storage shared by counters and gauges
//!
//! A [`SampleStore`] maps label-value tuples to stable slots without
//! allocating. Tuples are bound to slots in the order they are first seen,
//! and that order is the export order for the lifetime of the process.
//!
//! ## Locking
//!
//! The sensor task writes while the HTTP task reads. Every store keeps its
//! slots behind a blocking critical-section mutex, so a reader always sees a
//! value and its timestamp from the same write. Critical sections are short:
//! one linear scan over at most `N` keys.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::{LabelKey, LabelNames, MAX_CARDINALITY, MAX_LABELS, MetricsError, Sample};

#[derive(Debug, Clone)]
struct Slot {
    key: LabelKey,
    value: f64,
    timestamp_ms: u64,
}

impl Slot {
    fn new(key: LabelKey) -> Self {
        Self {
            key,
            value: 0.0,
            timestamp_ms: 0,
        }
    }
}

type Slots<const N: usize> = heapless::Vec<Slot, N>;

/// Per-series table of up to `N` distinct label-value tuples.
pub struct SampleStore<const N: usize = MAX_CARDINALITY> {
    label_names: LabelNames,
    slots: Mutex<CriticalSectionRawMutex, RefCell<Slots<N>>>,
}

impl<const N: usize> SampleStore<N> {
    /// Create a store for series labeled with `label_names`.
    ///
    /// A store without labels binds slot 0 immediately, so unlabeled series
    /// export `0` before their first update.
    pub fn new(label_names: &[&'static str]) -> Result<Self, MetricsError> {
        const { assert!(N > 0 && N <= MAX_CARDINALITY) };

        if label_names.is_empty() {
            return Ok(Self::unlabeled());
        }

        let label_names =
            LabelNames::from_slice(label_names).map_err(|_| MetricsError::TooManyLabels {
                declared: label_names.len(),
                max: MAX_LABELS,
            })?;

        Ok(Self {
            label_names,
            slots: Mutex::new(RefCell::new(Slots::new())),
        })
    }

    /// A store with no labels and slot 0 already bound.
    pub fn unlabeled() -> Self {
        const {
            assert!(
                N > 0 && N <= MAX_CARDINALITY,
                "series cardinality must be between 1 and MAX_CARDINALITY"
            )
        };

        let mut slots = Slots::<N>::new();
        // N > 0 is checked above
        let _ = slots.push(Slot::new(LabelKey::empty()));

        Self {
            label_names: LabelNames::new(),
            slots: Mutex::new(RefCell::new(slots)),
        }
    }

    pub fn label_names(&self) -> &[&'static str] {
        &self.label_names
    }

    /// Number of bound slots.
    pub fn len(&self) -> usize {
        self.slots.lock(|slots| slots.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `values` to its slot, binding a free slot on first sight.
    pub fn slot_for(&self, values: &[&str]) -> Result<usize, MetricsError> {
        self.slots
            .lock(|slots| self.bind(&mut slots.borrow_mut(), values))
    }

    fn bind(&self, slots: &mut Slots<N>, values: &[&str]) -> Result<usize, MetricsError> {
        if values.len() != self.label_names.len() {
            return Err(MetricsError::LabelArity {
                expected: self.label_names.len(),
                actual: values.len(),
            });
        }

        if values.is_empty() {
            return Ok(0);
        }

        if let Some(index) = slots.iter().position(|slot| slot.key.matches(values)) {
            return Ok(index);
        }

        let key = LabelKey::join(values)?;
        slots
            .push(Slot::new(key))
            .map_err(|_| MetricsError::CardinalityExceeded { capacity: N })?;

        Ok(slots.len() - 1)
    }

    /// Apply `update` to the value stored for `values` and stamp it.
    ///
    /// Slot resolution and the write happen under one lock.
    pub fn update(
        &self,
        values: &[&str],
        timestamp_ms: u64,
        update: impl FnOnce(f64) -> f64,
    ) -> Result<f64, MetricsError> {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            let index = self.bind(&mut slots, values)?;
            let slot = &mut slots[index];
            slot.value = update(slot.value);
            slot.timestamp_ms = timestamp_ms;
            Ok(slot.value)
        })
    }

    pub fn set(&self, values: &[&str], value: f64, timestamp_ms: u64) -> Result<(), MetricsError> {
        self.update(values, timestamp_ms, |_| value).map(|_| ())
    }

    pub fn add(&self, values: &[&str], delta: f64, timestamp_ms: u64) -> Result<(), MetricsError> {
        self.update(values, timestamp_ms, |current| current + delta)
            .map(|_| ())
    }

    /// Current value for `values`, without binding a slot.
    pub fn get(&self, values: &[&str]) -> Option<f64> {
        self.slots.lock(|slots| {
            let slots = slots.borrow();
            if values.is_empty() {
                return slots.first().map(|slot| slot.value);
            }
            slots
                .iter()
                .find(|slot| slot.key.matches(values))
                .map(|slot| slot.value)
        })
    }

    /// Copy bound slots into `out` in slot order; returns how many were written.
    pub fn fill(&self, out: &mut [Sample]) -> usize {
        self.slots.lock(|slots| {
            let slots = slots.borrow();
            let mut written = 0;
            for (slot, sample) in slots.iter().zip(out.iter_mut()) {
                sample.value = slot.value;
                sample.timestamp_ms = slot.timestamp_ms;
                sample.labels.clone_from(&slot.key);
                written += 1;
            }
            written
        })
    }

    /// Drop every bound tuple.
    pub fn reset(&self) {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            slots.clear();
            if self.label_names.is_empty() {
                let _ = slots.push(Slot::new(LabelKey::empty()));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_stable_for_repeated_tuples() {
        let store = SampleStore::<8>::new(&["sensor"]).unwrap();
        let a = store.slot_for(&["BME280"]).unwrap();
        let b = store.slot_for(&["SGP30"]).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(store.slot_for(&["BME280"]).unwrap(), a);
        assert_eq!(store.slot_for(&["SGP30"]).unwrap(), b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cardinality_boundary() {
        let store = SampleStore::<2>::new(&["a"]).unwrap();
        store.set(&["x"], 1.0, 0).unwrap();
        store.set(&["y"], 2.0, 0).unwrap();

        assert_eq!(
            store.set(&["z"], 3.0, 0),
            Err(MetricsError::CardinalityExceeded { capacity: 2 })
        );
        // Known tuples keep working once the table is full
        store.set(&["x"], 5.0, 0).unwrap();
        assert_eq!(store.get(&["x"]), Some(5.0));
        assert_eq!(store.get(&["z"]), None);
    }

    #[test]
    fn test_unlabeled_store_uses_slot_zero() {
        let store = SampleStore::<8>::new(&[]).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.slot_for(&[]).unwrap(), 0);
        assert_eq!(store.get(&[]), Some(0.0));

        store.add(&[], 2.5, 0).unwrap();
        store.add(&[], 2.5, 0).unwrap();
        assert_eq!(store.get(&[]), Some(5.0));
    }

    #[test]
    fn test_arity_is_checked() {
        let store = SampleStore::<8>::new(&["sensor", "code"]).unwrap();
        assert_eq!(
            store.slot_for(&["BME280"]),
            Err(MetricsError::LabelArity {
                expected: 2,
                actual: 1
            })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_too_many_label_names() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
        assert!(matches!(
            SampleStore::<8>::new(&names),
            Err(MetricsError::TooManyLabels {
                declared: 9,
                max: MAX_LABELS
            })
        ));
    }

    #[test]
    fn test_fill_copies_values_and_timestamps_in_slot_order() {
        let store = SampleStore::<8>::new(&["size"]).unwrap();
        store.set(&["PM2.5"], 12.0, 1_000).unwrap();
        store.set(&["PM1.0"], 4.0, 2_000).unwrap();

        let mut out = [Sample::EMPTY; 8];
        let written = store.fill(&mut out);

        assert_eq!(written, 2);
        assert_eq!(out[0].value, 12.0);
        assert_eq!(out[0].timestamp_ms, 1_000);
        assert!(out[0].labels.matches(&["PM2.5"]));
        assert_eq!(out[1].value, 4.0);
        assert!(out[1].labels.matches(&["PM1.0"]));
    }

    #[test]
    fn test_fill_respects_short_buffers() {
        let store = SampleStore::<8>::new(&["n"]).unwrap();
        for name in ["a", "b", "c"] {
            store.set(&[name], 1.0, 0).unwrap();
        }
        let mut out = [Sample::EMPTY; 2];
        assert_eq!(store.fill(&mut out), 2);
    }

    #[test]
    fn test_concurrent_set_and_fill_see_whole_updates() {
        const WRITES: u64 = 50_000;

        let store = SampleStore::<8>::new(&["n"]).unwrap();
        store.set(&["x"], 0.0, 0).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=WRITES {
                    store.set(&["x"], i as f64, i).unwrap();
                }
            });

            let mut out = [Sample::EMPTY; 8];
            for _ in 0..WRITES {
                assert_eq!(store.fill(&mut out), 1);
                assert_eq!(out[0].value as u64, out[0].timestamp_ms);
            }
        });

        assert_eq!(store.get(&["x"]), Some(WRITES as f64));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let labeled = SampleStore::<8>::new(&["n"]).unwrap();
        labeled.set(&["a"], 1.0, 0).unwrap();
        labeled.reset();
        assert!(labeled.is_empty());

        let unlabeled = SampleStore::<8>::new(&[]).unwrap();
        unlabeled.set(&[], 3.0, 0).unwrap();
        unlabeled.reset();
        assert_eq!(unlabeled.get(&[]), Some(0.0));
    }
}
