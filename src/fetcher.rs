//! Request coalescing for viewport-driven track data.
//!
//! Every pan or zoom tick asks the fetcher whether new data is needed for
//! the visible span. The fetcher answers at most once per escape from the
//! previously requested window, over-fetching one page on each side so that
//! small pans stay inside the recorded window and cost nothing.

use log::warn;

use crate::time::{DurationNs, TimeSpan};

/// The window actually handed to the data source, tagged with the
/// generation that must accompany the completed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub span: TimeSpan,
    pub resolution: DurationNs,
    pub generation: u64,
}

/// State machine deciding when a track needs fresh data.
///
/// The recorded window is updated synchronously inside [`request`], before
/// any fetch resolves. A second call arriving while the first fetch is in
/// flight therefore sees the updated state and coalesces instead of
/// spawning another fetch. Completions carry a generation; anything but the
/// latest generation is stale and dropped on delivery.
///
/// [`request`]: TimelineFetcher::request
#[derive(Debug)]
pub struct TimelineFetcher<T> {
    latest_span: Option<TimeSpan>,
    latest_resolution: DurationNs,
    data: Option<T>,
    generation: u64,
    alive: bool,
}

impl<T> Default for TimelineFetcher<T> {
    fn default() -> Self {
        TimelineFetcher::new()
    }
}

impl<T> TimelineFetcher<T> {
    pub fn new() -> TimelineFetcher<T> {
        TimelineFetcher {
            latest_span: None,
            latest_resolution: 0,
            data: None,
            generation: 0,
            alive: true,
        }
    }

    /// Ask for data covering `span` at `resolution`. Returns the over-fetch
    /// window to load when the current window no longer suffices, `None`
    /// when resident or in-flight data already covers the request.
    pub fn request(&mut self, span: TimeSpan, resolution: DurationNs) -> Option<FetchWindow> {
        if !self.alive {
            return None;
        }

        let needs_data = match self.latest_span {
            None => true,
            Some(latest) => {
                span.start() < latest.start()
                    || span.end() > latest.end()
                    || resolution != self.latest_resolution
            }
        };
        if !needs_data {
            return None;
        }

        // One full page of slack on either side.
        let window = span.pad(span.duration());
        self.latest_span = Some(window);
        self.latest_resolution = resolution;
        self.generation += 1;

        Some(FetchWindow {
            span: window,
            resolution,
            generation: self.generation,
        })
    }

    /// Accept a completed fetch. Returns false when the payload is stale
    /// (superseded generation) or the fetcher has been disposed; the
    /// payload is dropped in both cases.
    pub fn deliver(&mut self, generation: u64, data: T) -> bool {
        if !self.alive {
            return false;
        }
        if generation != self.generation {
            warn!(
                "dropping stale fetch result (generation {generation}, current {})",
                self.generation
            );
            return false;
        }
        self.data = Some(data);
        true
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn latest_span(&self) -> Option<TimeSpan> {
        self.latest_span
    }

    pub fn latest_resolution(&self) -> DurationNs {
        self.latest_resolution
    }

    /// Forget the recorded window and payload so the next [`request`]
    /// fetches unconditionally. Used after a failed fetch or when upstream
    /// configuration invalidates resident data.
    ///
    /// [`request`]: TimelineFetcher::request
    pub fn invalidate(&mut self) {
        self.latest_span = None;
        self.latest_resolution = 0;
        self.data = None;
        self.generation += 1;
    }

    /// Release the payload and refuse all further requests and deliveries.
    /// An in-flight fetch is not aborted; its completion is simply ignored.
    pub fn dispose(&mut self) {
        self.alive = false;
        self.data = None;
        self.latest_span = None;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeNs;

    fn span(start: i64, end: i64) -> TimeSpan {
        TimeSpan::new(TimeNs::from_raw(start), TimeNs::from_raw(end))
    }

    #[test]
    fn first_request_overfetches_one_page_each_side() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let window = fetcher.request(span(1000, 3000), 10).unwrap();

        assert_eq!(window.span, span(-1000, 5000));
        assert_eq!(window.resolution, 10);
        assert_eq!(fetcher.latest_span(), Some(span(-1000, 5000)));
        assert_eq!(fetcher.latest_resolution(), 10);
    }

    #[test]
    fn shrinking_subwindows_coalesce() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let window = fetcher.request(span(1000, 3000), 10).unwrap();
        fetcher.deliver(window.generation, vec![1]);

        // Strictly shrinking sub-windows of the satisfied window at the
        // same resolution must not trigger another fetch.
        assert!(fetcher.request(span(1200, 2800), 10).is_none());
        assert!(fetcher.request(span(1500, 2500), 10).is_none());
        assert!(fetcher.request(span(1900, 2000), 10).is_none());
    }

    #[test]
    fn coalesces_while_first_fetch_is_in_flight() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let first = fetcher.request(span(1000, 3000), 10).unwrap();

        // No delivery yet, but the recorded window already covers this.
        assert!(fetcher.request(span(1100, 2900), 10).is_none());

        assert!(fetcher.deliver(first.generation, vec![1]));
        assert_eq!(fetcher.data(), Some(&vec![1]));
    }

    #[test]
    fn escaping_the_window_refetches() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let first = fetcher.request(span(1000, 3000), 10).unwrap();
        fetcher.deliver(first.generation, vec![1]);

        let second = fetcher.request(span(4000, 6000), 10).unwrap();
        assert_eq!(second.span, span(2000, 8000));
        assert!(second.generation > first.generation);
    }

    #[test]
    fn resolution_change_refetches() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let first = fetcher.request(span(1000, 3000), 10).unwrap();
        fetcher.deliver(first.generation, vec![1]);

        assert!(fetcher.request(span(1500, 2500), 20).is_some());
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let first = fetcher.request(span(1000, 3000), 10).unwrap();
        let second = fetcher.request(span(9000, 9500), 10).unwrap();

        // The first fetch completes after being superseded.
        assert!(!fetcher.deliver(first.generation, vec![1]));
        assert!(fetcher.data().is_none());

        assert!(fetcher.deliver(second.generation, vec![2]));
        assert_eq!(fetcher.data(), Some(&vec![2]));
    }

    #[test]
    fn disposed_fetcher_ignores_everything() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let window = fetcher.request(span(1000, 3000), 10).unwrap();
        fetcher.dispose();

        assert!(!fetcher.deliver(window.generation, vec![1]));
        assert!(fetcher.data().is_none());
        assert!(fetcher.request(span(0, 100), 10).is_none());
    }

    #[test]
    fn invalidate_forces_the_next_fetch() {
        let mut fetcher: TimelineFetcher<Vec<u8>> = TimelineFetcher::new();
        let first = fetcher.request(span(1000, 3000), 10).unwrap();
        fetcher.deliver(first.generation, vec![1]);

        fetcher.invalidate();
        assert!(fetcher.data().is_none());
        assert!(fetcher.request(span(1500, 2500), 10).is_some());
    }
}
