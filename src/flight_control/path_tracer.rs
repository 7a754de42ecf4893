use super::trace_gate::TraceGate;
use crate::util::GeoPoint;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Duration;

/// Position in the history of a trace: the reset it belongs to and its sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteCursor {
    generation: u64,
    samples: usize,
}

/// How a route changed since a [`RouteCursor`].
#[derive(Debug, Clone, PartialEq)]
pub enum RouteUpdate {
    /// The trace was reset. Carries the whole new route, origin first.
    Replace(Vec<GeoPoint>),
    /// Samples appended to the route already known.
    Extend(Vec<GeoPoint>),
}

#[derive(Debug, Default)]
struct TraceLog {
    /// Bumped on every reset.
    generation: u64,
    origin: Option<GeoPoint>,
    samples: Vec<GeoPoint>,
}

impl TraceLog {
    fn cursor(&self) -> RouteCursor {
        RouteCursor { generation: self.generation, samples: self.samples.len() }
    }

    fn route(&self) -> Vec<GeoPoint> {
        self.origin.into_iter().chain(self.samples.iter().copied()).collect()
    }
}

/// Shared read access to the trace of a [`PathTracer`].
///
/// Consumers keep the [`RouteCursor`] of what they have already seen and only pull the
/// samples appended since, so following a long trace costs nothing per unchanged point.
#[derive(Debug, Clone, Default)]
pub struct RouteView {
    log: Arc<RwLock<TraceLog>>,
}

impl RouteView {
    // the lock is never held across a panic point, a poisoned log is still consistent
    fn read(&self) -> RwLockReadGuard<'_, TraceLog> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TraceLog> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cursor(&self) -> RouteCursor { self.read().cursor() }

    /// Origin followed by all samples.
    #[cfg(test)]
    pub fn points(&self) -> Vec<GeoPoint> { self.read().route() }

    #[cfg(test)]
    pub fn sample_count(&self) -> usize { self.read().samples.len() }

    /// Computes what changed after `seen`.
    ///
    /// # Arguments
    /// * `seen` – Cursor of the last update taken, `None` for a consumer without any route.
    ///
    /// # Returns
    /// * `(RouteCursor, Option<RouteUpdate>)` – The current cursor and the change since `seen`,
    ///   `None` if there is nothing new.
    pub fn update_since(&self, seen: Option<RouteCursor>) -> (RouteCursor, Option<RouteUpdate>) {
        let log = self.read();
        let now = log.cursor();
        let update = match seen {
            Some(seen) if seen == now => None,
            Some(seen) if seen.generation == now.generation && seen.samples < now.samples => {
                Some(RouteUpdate::Extend(log.samples[seen.samples..].to_vec()))
            }
            _ => Some(RouteUpdate::Replace(log.route())),
        };
        (now, update)
    }
}

/// Delayed, resettable trace of the positions visited during the current maneuver.
///
/// A reset stores the maneuver origin and arms the start delay. Samples are only appended
/// once the delay has elapsed, so the sample buffer stays empty for the whole delay.
#[derive(Debug)]
pub struct PathTracer {
    log: RouteView,
    gate: TraceGate,
    delay: Duration,
    /// `false` after a halt, until the next reset.
    active: bool,
}

impl PathTracer {
    pub fn new(delay: Duration) -> Self {
        Self { log: RouteView::default(), gate: TraceGate::new(), delay, active: false }
    }

    /// Starts a new trace at `origin`, discarding the previous one.
    pub fn reset(&mut self, origin: GeoPoint) {
        {
            let mut log = self.log.write();
            log.generation += 1;
            log.origin = Some(origin);
            log.samples.clear();
        }
        self.gate.arm(self.delay);
        self.active = true;
    }

    /// Stops recording. The trace is retained until the next reset.
    pub fn halt(&mut self) {
        self.gate.cancel();
        self.active = false;
    }

    /// Appends `pos` if the delay of the current trace has elapsed.
    ///
    /// # Returns
    /// * `bool` – Whether the position was recorded.
    pub fn record(&mut self, pos: GeoPoint) -> bool {
        if self.is_tracing() {
            self.log.write().samples.push(pos);
            true
        } else {
            false
        }
    }

    pub fn view(&self) -> RouteView { self.log.clone() }

    pub fn is_tracing(&self) -> bool { self.active && self.gate.is_open() }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool { self.active && self.gate.is_pending() }

    #[cfg(test)]
    pub fn samples(&self) -> Vec<GeoPoint> { self.log.read().samples.clone() }

    #[cfg(test)]
    pub fn origin(&self) -> Option<GeoPoint> { self.log.read().origin }
}
