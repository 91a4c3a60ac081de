//! Trace ingestion: measureme profdata in, an immutable query engine plus
//! track descriptors out.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use analyzeme::ProfilingData;
use log::info;
use rayon::prelude::*;

use crate::engine::{
    CounterId, EngineBuilder, InMemoryEngine, SliceRow, SliceTrackId, TraceEngine,
};
use crate::time::{TimeNs, TimeSpan};

/// What kind of track to build for one engine table.
#[derive(Debug, Clone)]
pub enum TrackDescriptor {
    Slices {
        id: SliceTrackId,
        title: String,
        max_depth: u32,
    },
    Counter {
        id: CounterId,
        title: String,
        unit: String,
    },
}

/// A fully ingested trace.
#[derive(Clone)]
pub struct ProfileData {
    pub engine: Arc<InMemoryEngine>,
    pub descriptors: Vec<TrackDescriptor>,
    pub trace_span: TimeSpan,
    pub event_count: usize,
    pub cmd: String,
    pub pid: u32,
    pub load_duration_ns: u64,
}

impl std::fmt::Debug for ProfileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileData")
            .field("event_count", &self.event_count)
            .field("tracks", &self.descriptors.len())
            .field("trace_span", &self.trace_span)
            .finish_non_exhaustive()
    }
}

pub fn load_profiling_data(path: &Path) -> Result<ProfileData, String> {
    let started = Instant::now();
    let stem = path.with_extension("");

    let data = ProfilingData::new(&stem)
        .map_err(|e| format!("Failed to load profiling data from {:?}: {}", stem, e))?;

    let metadata = data.metadata();

    // Interval events become slices, grouped per thread. Instant events
    // become cumulative counters, grouped per event kind.
    let mut thread_events: BTreeMap<u64, Vec<(String, u64, u64)>> = BTreeMap::new();
    let mut instants: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    let mut event_count = 0usize;

    for lightweight_event in data.iter() {
        let event = data.to_full_event(&lightweight_event);
        let thread_id = event.thread_id as u64;

        let analyzeme::EventPayload::Timestamp(timestamp) = &event.payload else {
            continue;
        };
        event_count += 1;

        match timestamp {
            analyzeme::Timestamp::Interval { start, end } => {
                let start_ns = start
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64;
                let end_ns = end
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64;
                thread_events.entry(thread_id).or_default().push((
                    event.label.to_string(),
                    start_ns,
                    end_ns,
                ));
            }
            analyzeme::Timestamp::Instant(at) => {
                let ns = at
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64;
                instants
                    .entry(event.event_kind.to_string())
                    .or_default()
                    .push(ns);
            }
        }
    }

    // Depth-stack each thread independently.
    let mut per_thread: Vec<(u64, Vec<(String, u64, u64)>)> = thread_events.into_iter().collect();
    let stacked: Vec<(u64, Vec<SliceRow>, u32)> = per_thread
        .par_iter_mut()
        .map(|(thread_id, events)| {
            events.sort_by_key(|(_, start, _)| *start);

            let mut rows = Vec::with_capacity(events.len());
            let mut stack: Vec<u64> = Vec::new();
            let mut max_depth = 0u32;
            for (label, start_ns, end_ns) in events.iter() {
                while let Some(&last_end) = stack.last() {
                    if last_end <= *start_ns {
                        stack.pop();
                    } else {
                        break;
                    }
                }
                let depth = stack.len() as u32;
                max_depth = max_depth.max(depth);
                stack.push(*end_ns);

                rows.push(SliceRow {
                    start: TimeNs::from_raw(*start_ns as i64),
                    dur: end_ns.saturating_sub(*start_ns) as i64,
                    depth,
                    label: label.clone(),
                });
            }
            (*thread_id, rows, max_depth)
        })
        .collect();

    let mut builder = EngineBuilder::new();
    let mut descriptors = Vec::new();

    for (thread_id, rows, max_depth) in stacked {
        let id = builder.add_slice_track(rows);
        descriptors.push(TrackDescriptor::Slices {
            id,
            title: format!("Thread {thread_id}"),
            max_depth,
        });
    }

    // One cumulative counter per instant-event kind. Value mode shows the
    // running total; delta and rate modes turn it into events per bucket
    // and events per second.
    for (kind, mut timestamps) in instants {
        timestamps.sort_unstable();
        let samples: Vec<(TimeNs, f64)> = timestamps
            .iter()
            .enumerate()
            .map(|(i, &ns)| (TimeNs::from_raw(ns as i64), (i + 1) as f64))
            .collect();
        let id = builder.add_counter(samples);
        descriptors.push(TrackDescriptor::Counter {
            id,
            title: kind,
            unit: "events".to_string(),
        });
    }

    let engine = builder.build();
    let trace_span = engine.trace_span();
    let load_duration_ns = started.elapsed().as_nanos() as u64;
    info!(
        "loaded {:?}: {} events, {} tracks in {}ms",
        stem,
        event_count,
        descriptors.len(),
        load_duration_ns / 1_000_000
    );

    Ok(ProfileData {
        engine: Arc::new(engine),
        descriptors,
        trace_span,
        event_count,
        cmd: metadata.cmd.clone(),
        pid: metadata.process_id,
        load_duration_ns,
    })
}

pub fn format_panic_payload(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Loading thread panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Loading thread panicked: {}", message)
    } else {
        "Loading thread panicked with unknown payload".to_string()
    }
}
