//! Accumulation of partial generation results and debounced projection.

use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Default quiet period before a projection is recomputed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Holds the partially generated domain object for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    fields: Map<String, Value>,
    merges: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a field. Lists are replaced wholesale since upstream sends the
    /// complete array on every update.
    pub fn merge(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
        self.merges += 1;
    }

    /// Push one item onto a list field, creating the list if needed.
    pub fn append(&mut self, field: &str, item: Value) {
        let entry = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(item),
            other => *other = Value::Array(vec![item]),
        }
        self.merges += 1;
    }

    /// Shallow-merge an object into the accumulated result.
    pub fn extend(&mut self, map: Map<String, Value>) {
        for (key, value) in map {
            self.fields.insert(key, value);
        }
        self.merges += 1;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Items of a list field; empty when absent or not a list.
    pub fn list(&self, field: &str) -> &[Value] {
        self.fields
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, field: &str) -> usize {
        self.list(field).len()
    }

    /// Number of mutations applied so far.
    pub fn merges(&self) -> usize {
        self.merges
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Recomputes a derived view only after a burst of updates settles.
///
/// The projector owns no timer: callers read [`deadline`](Self::deadline) and
/// sleep until it inside their own event loop, so dropping the loop drops the
/// timer with it.
#[derive(Debug)]
pub struct DebouncedProjector<V> {
    delay: Duration,
    deadline: Option<Instant>,
    dirty: bool,
    latest: Option<V>,
    recomputations: usize,
}

impl<V> DebouncedProjector<V> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            dirty: false,
            latest: None,
            recomputations: 0,
        }
    }

    /// Note a change that should show up in the next projection without
    /// arming the timer.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Cancel any pending deadline and arm a new one.
    pub fn schedule(&mut self) {
        self.dirty = true;
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether the armed deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Disarm the timer without recomputing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Recompute now and disarm the timer.
    pub fn fire(&mut self, project: impl FnOnce() -> V) -> &V {
        self.deadline = None;
        self.dirty = false;
        self.recomputations += 1;
        self.latest.insert(project())
    }

    /// Run any pending or outstanding recomputation immediately. A flush with
    /// nothing outstanding leaves the projection untouched.
    pub fn flush(&mut self, project: impl FnOnce() -> V) -> Option<&V> {
        if self.deadline.is_some() || self.dirty || self.latest.is_none() {
            self.fire(project);
        }
        self.latest.as_ref()
    }

    pub fn latest(&self) -> Option<&V> {
        self.latest.as_ref()
    }

    /// How many times the projection has been computed.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }
}

impl<V> Default for DebouncedProjector<V> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
