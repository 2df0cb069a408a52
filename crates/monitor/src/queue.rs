//! Bounded dispatch of monthly aggregations
//!
//! Requests are queued eagerly and dispatched in batches no larger than
//! [`MAX_CONCURRENT_AGGREGATIONS`]. With the ceiling at 1 this is a strict
//! sequential fold over the window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};
use vegmon_algorithms::maybe_rayon::*;

use crate::aggregate::{aggregate_month, MonthlyRecord};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::service::{ImageryService, MonthlyReduction};

/// Most aggregations in flight at once
pub const MAX_CONCURRENT_AGGREGATIONS: usize = 1;

/// FIFO of monthly reductions against one service
pub struct AggregationQueue<'a, S: ?Sized> {
    service: &'a S,
    retry: RetryPolicy,
    pending: VecDeque<MonthlyReduction<'a>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl<'a, S: ImageryService + ?Sized> AggregationQueue<'a, S> {
    pub fn new(service: &'a S, retry: RetryPolicy) -> Self {
        Self {
            service,
            retry,
            pending: VecDeque::new(),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn submit(&mut self, request: MonthlyReduction<'a>) {
        self.pending.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Highest number of aggregations observed running together
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Drain the queue, one record per request in submission order.
    ///
    /// `on_record` sees each record as soon as it is available. The first
    /// month that still fails after retries aborts the run.
    pub fn run<F>(&mut self, mut on_record: F) -> Result<Vec<MonthlyRecord>>
    where
        F: FnMut(&MonthlyRecord),
    {
        let total = self.pending.len();
        let mut records = Vec::with_capacity(total);

        while !self.pending.is_empty() {
            let take = self.pending.len().min(MAX_CONCURRENT_AGGREGATIONS);
            let batch: Vec<MonthlyReduction<'a>> = self.pending.drain(..take).collect();

            let results: Vec<Result<MonthlyRecord>> = batch
                .into_par_iter()
                .map(|request| self.dispatch(&request))
                .collect();

            for result in results {
                let record = result?;
                info!(
                    month = %record.month,
                    area_ha = record.area_ha,
                    n_scenes = record.n_scenes,
                    valid_frac = record.valid_frac,
                    "[{}/{}] month aggregated",
                    records.len() + 1,
                    total
                );
                on_record(&record);
                records.push(record);
            }
        }
        Ok(records)
    }

    fn dispatch(&self, request: &MonthlyReduction<'_>) -> Result<MonthlyRecord> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        debug!(month = %request.label(), in_flight = now, "dispatching aggregation");

        let label = request.label();
        let result = self
            .retry
            .run(&label, || aggregate_month(self.service, request));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
