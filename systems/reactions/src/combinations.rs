use grainfield_core::Reaction;

use crate::{BoundNeighbour, GridView};

/// Fills `out` with every neighbour of `origin` satisfying `reaction`.
pub(crate) fn matching_neighbours(
    reaction: &Reaction,
    origin: usize,
    view: &GridView<'_>,
    out: &mut Vec<BoundNeighbour>,
) {
    out.clear();
    for direction in reaction.directions().iter() {
        let index = view.lattice().neighbour(origin, direction);
        let occupant = view.occupant(index);
        if reaction.matches(occupant) {
            out.push(BoundNeighbour {
                direction,
                index,
                occupant,
                age: view.age(index),
            });
        }
    }
}

/// Cartesian product of the per-reaction options.
///
/// A combination may bind a cell at most once and never the origin itself,
/// which small toroidal axes would otherwise allow.
pub(crate) fn enumerate(options: &[Vec<BoundNeighbour>], origin: usize) -> Vec<Vec<BoundNeighbour>> {
    let mut combinations: Vec<Vec<BoundNeighbour>> = vec![Vec::with_capacity(options.len())];

    for choices in options {
        let mut extended = Vec::with_capacity(combinations.len() * choices.len());
        for partial in &combinations {
            for choice in choices {
                let reused = choice.index == origin
                    || partial.iter().any(|bound| bound.index == choice.index);
                if reused {
                    continue;
                }
                let mut next = partial.clone();
                next.push(*choice);
                extended.push(next);
            }
        }

        combinations = extended;
        if combinations.is_empty() {
            break;
        }
    }

    combinations
}
