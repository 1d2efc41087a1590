#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Running population and field statistics for the Grainfield engine.

use grainfield_core::{FieldId, GrainId, StepReport};

/// Per-step series of one identifier.
#[derive(Clone, Debug, PartialEq)]
struct Series<K, V> {
    id: K,
    values: Vec<V>,
}

/// Population and field histories with running maxima for chart scaling.
///
/// Series are kept in the order identifiers were registered. Every call to
/// [`Statistics::record`] appends exactly one value to each series.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    grains: Vec<Series<GrainId, u32>>,
    fields: Vec<Series<FieldId, f64>>,
    max_grain_count: u32,
    max_field_amount: f64,
    last_report: Option<StepReport>,
}

impl Statistics {
    /// Creates empty histories for the provided grains and fields.
    #[must_use]
    pub fn new<G, F>(grains: G, fields: F) -> Self
    where
        G: IntoIterator<Item = GrainId>,
        F: IntoIterator<Item = FieldId>,
    {
        Self {
            grains: grains
                .into_iter()
                .map(|id| Series {
                    id,
                    values: Vec::new(),
                })
                .collect(),
            fields: fields
                .into_iter()
                .map(|id| Series {
                    id,
                    values: Vec::new(),
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Appends one sample per series.
    ///
    /// `grain_counts` and `field_totals` are given in registration order;
    /// missing trailing entries are recorded as zero.
    pub fn record(&mut self, grain_counts: &[u32], field_totals: &[f64]) {
        for (position, series) in self.grains.iter_mut().enumerate() {
            let count = grain_counts.get(position).copied().unwrap_or(0);
            self.max_grain_count = self.max_grain_count.max(count);
            series.values.push(count);
        }

        for (position, series) in self.fields.iter_mut().enumerate() {
            let total = field_totals.get(position).copied().unwrap_or(0.0);
            if total > self.max_field_amount {
                self.max_field_amount = total;
            }
            series.values.push(total);
        }
    }

    /// Remembers the counters of the step that just completed.
    pub fn observe(&mut self, report: StepReport) {
        self.last_report = Some(report);
    }

    /// Drops every sample and records a fresh initial one.
    pub fn reset_with(&mut self, grain_counts: &[u32], field_totals: &[f64]) {
        for series in &mut self.grains {
            series.values.clear();
        }
        for series in &mut self.fields {
            series.values.clear();
        }
        self.max_grain_count = 0;
        self.max_field_amount = 0.0;
        self.last_report = None;
        self.record(grain_counts, field_totals);
    }

    /// Population series of `grain`, one sample per recorded step.
    #[must_use]
    pub fn grain_history(&self, grain: GrainId) -> Option<&[u32]> {
        self.grains
            .iter()
            .find(|series| series.id == grain)
            .map(|series| series.values.as_slice())
    }

    /// Total-intensity series of `field`, one sample per recorded step.
    #[must_use]
    pub fn field_history(&self, field: FieldId) -> Option<&[f64]> {
        self.fields
            .iter()
            .find(|series| series.id == field)
            .map(|series| series.values.as_slice())
    }

    /// Latest population of every grain in registration order.
    pub fn latest_populations(&self) -> impl Iterator<Item = (GrainId, u32)> + '_ {
        self.grains
            .iter()
            .map(|series| (series.id, series.values.last().copied().unwrap_or(0)))
    }

    /// Latest total intensity of every field in registration order.
    pub fn latest_field_totals(&self) -> impl Iterator<Item = (FieldId, f64)> + '_ {
        self.fields
            .iter()
            .map(|series| (series.id, series.values.last().copied().unwrap_or(0.0)))
    }

    /// Largest population any grain reached.
    #[must_use]
    pub fn max_grain_count(&self) -> u32 {
        self.max_grain_count
    }

    /// Largest total intensity any field reached.
    #[must_use]
    pub fn max_field_amount(&self) -> f64 {
        self.max_field_amount
    }

    /// Counters of the most recent step, if one ran since the last reset.
    #[must_use]
    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Number of samples in every series.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.grains
            .first()
            .map(|series| series.values.len())
            .or_else(|| self.fields.first().map(|series| series.values.len()))
            .unwrap_or(0)
    }
}
