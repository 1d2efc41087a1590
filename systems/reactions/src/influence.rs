use grainfield_core::{Behaviour, INFLUENCE_SHARPENING_EXPONENT, MIN_FIELD};
use rand::Rng;

use crate::{BoundNeighbour, GridView, RuleTable};

/// Converts influence scores into sampling weights.
///
/// Scores are shifted so the smallest becomes zero, then `score + 1` is raised
/// to [`INFLUENCE_SHARPENING_EXPONENT`]. Equal scores produce equal weights.
#[must_use]
pub fn sharpened_weights(scores: &[f64]) -> Vec<f64> {
    let floor = scores.iter().copied().fold(f64::INFINITY, f64::min);
    scores
        .iter()
        .map(|score| (score - floor + 1.0).powi(INFLUENCE_SHARPENING_EXPONENT))
        .collect()
}

/// Picks the index of one neighbour combination.
///
/// Uniform when the behaviour carries no field influence, otherwise weighted
/// by the sharpened log-ratio of neighbour to local field intensity.
pub(crate) fn choose_combination<R: Rng>(
    combinations: &[Vec<BoundNeighbour>],
    behaviour: &Behaviour,
    table: &RuleTable,
    view: &GridView<'_>,
    origin: usize,
    rng: &mut R,
) -> usize {
    if combinations.len() < 2 {
        return 0;
    }

    let influences: Vec<(usize, f64)> = behaviour
        .field_influences()
        .iter()
        .filter_map(|influence| {
            table
                .field_slot(influence.field())
                .map(|slot| (slot, f64::from(influence.weight())))
        })
        .collect();
    if influences.is_empty() {
        return rng.gen_range(0..combinations.len());
    }

    let scores: Vec<f64> = combinations
        .iter()
        .map(|combination| influence_score(combination, &influences, view, origin))
        .collect();
    let weights = sharpened_weights(&scores);

    pick_cumulative(&weights, rng).unwrap_or_else(|| rng.gen_range(0..combinations.len()))
}

fn influence_score(
    combination: &[BoundNeighbour],
    influences: &[(usize, f64)],
    view: &GridView<'_>,
    origin: usize,
) -> f64 {
    combination
        .iter()
        .flat_map(|bound| {
            influences.iter().map(move |&(slot, weight)| {
                let local = log_intensity(view.field_value(slot, origin));
                let remote = log_intensity(view.field_value(slot, bound.index));
                weight * (remote - local)
            })
        })
        .sum()
}

fn log_intensity(value: f32) -> f64 {
    f64::from(value.max(MIN_FIELD)).log10()
}

/// Draws an index with probability proportional to its weight.
///
/// Returns `None` without drawing when the weights cannot form a distribution.
fn pick_cumulative<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for weight in weights {
        total += weight;
        cumulative.push(total);
    }
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let target = rng.gen::<f64>() * total;
    cumulative
        .iter()
        .position(|bound| target < *bound)
        .or(weights.len().checked_sub(1))
}
