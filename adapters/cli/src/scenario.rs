use std::{fs, path::Path};

use anyhow::{bail, ensure, Context, Result};
use grainfield_core::{Behaviour, Field, Grain, GrainId, Lattice, RuleModel};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

const SUPPORTED_SCENARIO_VERSION: u32 = 1;

/// Offsets the scatter stream so placements never share draws with the simulation.
const SCATTER_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Rule model, lattice and initial layout described by a scenario file.
#[derive(Debug)]
pub(crate) struct Scenario {
    pub(crate) model: RuleModel,
    pub(crate) lattice: Lattice,
    pub(crate) layout: Vec<Option<GrainId>>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    version: u32,
    grid: GridConfig,
    #[serde(default)]
    grains: Vec<Grain>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(default)]
    behaviours: Vec<Behaviour>,
    #[serde(default)]
    placements: Vec<Placement>,
    #[serde(default)]
    scatter: Vec<Scatter>,
}

#[derive(Debug, Deserialize)]
struct GridConfig {
    width: u32,
    height: u32,
    #[serde(default = "default_depth")]
    depth: u32,
}

fn default_depth() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct Placement {
    grain: GrainId,
    x: u32,
    y: u32,
    #[serde(default)]
    z: u32,
}

#[derive(Debug, Deserialize)]
struct Scatter {
    grain: GrainId,
    count: usize,
}

impl Scenario {
    /// Reads and builds the scenario stored at `path`.
    pub(crate) fn load(path: impl AsRef<Path>, seed: u64) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario at {}", path.display()))?;
        Self::parse(&contents, seed)
            .with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Builds a scenario from TOML text.
    ///
    /// Explicit placements are applied first, then every scatter entry fills
    /// distinct empty cells chosen from a stream derived from `seed`.
    pub(crate) fn parse(contents: &str, seed: u64) -> Result<Self> {
        let file: ScenarioFile =
            toml::from_str(contents).context("failed to parse scenario toml contents")?;
        if file.version != SUPPORTED_SCENARIO_VERSION {
            bail!(
                "unsupported scenario version {}; expected {}",
                file.version,
                SUPPORTED_SCENARIO_VERSION
            );
        }

        let lattice = Lattice::new(file.grid.width, file.grid.height, file.grid.depth)?;
        let model = RuleModel::new(file.grains, file.fields, file.behaviours);
        let mut layout = vec![None; lattice.data_size()];

        for placement in &file.placements {
            ensure!(
                lattice.position_inside(
                    i64::from(placement.x),
                    i64::from(placement.y),
                    i64::from(placement.z)
                ),
                "placement of grain {} at ({}, {}, {}) lies outside the grid",
                placement.grain,
                placement.x,
                placement.y,
                placement.z
            );
            layout[lattice.to_index(placement.x, placement.y, placement.z)] = Some(placement.grain);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ SCATTER_STREAM);
        for scatter in &file.scatter {
            let mut empty: Vec<usize> = layout
                .iter()
                .enumerate()
                .filter(|(_, agent)| agent.is_none())
                .map(|(index, _)| index)
                .collect();
            ensure!(
                scatter.count <= empty.len(),
                "cannot scatter {} agents of grain {} over {} empty cells",
                scatter.count,
                scatter.grain,
                empty.len()
            );

            let (chosen, _) = empty.partial_shuffle(&mut rng, scatter.count);
            for index in chosen.iter() {
                layout[*index] = Some(scatter.grain);
            }
        }

        model
            .validate_layout(&lattice, &layout)
            .context("scenario layout does not match its rule model")?;

        Ok(Self {
            model,
            lattice,
            layout,
        })
    }
}
