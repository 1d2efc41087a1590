use grainfield_core::{
    Behaviour, Command, DirectionSet, EvaluatorError, Event, Field, FieldCoefficients, FieldId,
    Grain, GrainId, Lattice, Position, Reaction, RuleModel, MIN_FIELD,
};
use grainfield_world::{self as world, query, Simulator};

const A: GrainId = GrainId::new(0);
const B: GrainId = GrainId::new(1);
const SUGAR: FieldId = FieldId::new(0);

fn spreading_model() -> RuleModel {
    RuleModel::new(
        vec![Grain::new(A)],
        Vec::new(),
        vec![Behaviour::new(A, Some(A), 1.0).with_reaction(Reaction::new(
            None,
            Some(A),
            DirectionSet::FOUR,
        ))],
    )
}

#[test]
fn single_agent_spreads_into_one_orthogonal_neighbour() {
    let lattice = Lattice::planar(3, 3).expect("valid lattice");
    let mut layout = vec![None; 9];
    layout[4] = Some(A);
    let mut simulator =
        Simulator::seeded(&spreading_model(), lattice, layout, 5).expect("valid model");

    let report = simulator.one_step();

    assert_eq!(report.applied, 1);
    assert_eq!(query::population(&simulator, A), 2);
    let spawned: Vec<usize> = query::agents(&simulator)
        .iter()
        .enumerate()
        .filter(|(index, agent)| *index != 4 && agent.is_some())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(spawned.len(), 1);
    assert!([1, 3, 5, 7].contains(&spawned[0]), "spawned at {spawned:?}");

    let ages = query::ages(&simulator);
    assert_eq!(ages[4], Some(1));
    assert_eq!(ages[spawned[0]], Some(0));
}

#[test]
fn unit_half_life_kills_about_half_the_population() {
    let lattice = Lattice::planar(100, 100).expect("valid lattice");
    let model = RuleModel::new(
        vec![Grain::new(A).with_half_life(1.0)],
        Vec::new(),
        Vec::new(),
    );
    let layout = vec![Some(A); lattice.data_size()];
    let mut simulator = Simulator::seeded(&model, lattice, layout, 2024).expect("valid model");

    let report = simulator.one_step();

    let rate = f64::from(report.deaths) / 10_000.0;
    assert!((rate - 0.5).abs() < 0.03, "death rate {rate}");
    assert_eq!(
        query::population(&simulator, A) + report.deaths as usize,
        10_000
    );
}

#[test]
fn competing_behaviours_never_both_claim_the_shared_cell() {
    let model = RuleModel::new(
        vec![Grain::new(A), Grain::new(B)],
        Vec::new(),
        vec![
            Behaviour::new(A, Some(A), 1.0).with_reaction(Reaction::new(
                None,
                Some(A),
                DirectionSet::EMPTY.with(grainfield_core::Direction::East),
            )),
            Behaviour::new(B, Some(B), 1.0).with_reaction(Reaction::new(
                None,
                Some(B),
                DirectionSet::EMPTY.with(grainfield_core::Direction::West),
            )),
        ],
    );

    let mut winners = [0usize; 2];
    for seed in 0..64 {
        let lattice = Lattice::planar(3, 1).expect("valid lattice");
        let layout = vec![Some(A), None, Some(B)];
        let mut simulator = Simulator::seeded(&model, lattice, layout, seed).expect("valid model");

        let report = simulator.one_step();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.applied, 1);
        match simulator.grain_at_index(1) {
            Some(grain) if grain == A => winners[0] += 1,
            Some(grain) if grain == B => winners[1] += 1,
            other => panic!("shared cell holds {other:?}"),
        }
        assert_eq!(
            query::population(&simulator, A) + query::population(&simulator, B),
            3
        );
    }

    assert!(winners[0] > 0 && winners[1] > 0, "winners {winners:?}");
}

#[test]
fn movement_conserves_population() {
    let lattice = Lattice::planar(10, 10).expect("valid lattice");
    let model = RuleModel::new(
        vec![Grain::new(A).with_movement(0.8, DirectionSet::EIGHT)],
        Vec::new(),
        Vec::new(),
    );
    let layout = (0..lattice.data_size())
        .map(|index| (index % 3 == 0).then_some(A))
        .collect::<Vec<_>>();
    let expected = layout.iter().flatten().count();
    let mut simulator = Simulator::seeded(&model, lattice, layout, 77).expect("valid model");

    for _ in 0..50 {
        let report = simulator.one_step();
        assert_eq!(query::population(&simulator, A), expected);
        assert!(report.applied <= report.candidates);
    }

    let history = query::grain_history(&simulator, A).expect("grain recorded");
    assert_eq!(history.len(), 51);
    assert!(history.iter().all(|count| *count as usize == expected));
    assert_eq!(query::max_grain_count(&simulator) as usize, expected);
}

#[test]
fn static_fields_are_left_untouched() {
    let lattice = Lattice::planar(5, 5).expect("valid lattice");
    let model = RuleModel::new(
        vec![Grain::new(A).with_movement(0.5, DirectionSet::FOUR)],
        vec![Field::new(SUGAR)],
        Vec::new(),
    );
    let mut layout = vec![None; lattice.data_size()];
    layout[0] = Some(A);
    layout[12] = Some(A);
    let mut simulator = Simulator::seeded(&model, lattice, layout, 3).expect("valid model");
    for index in 0..25 {
        let _ = simulator
            .set_field_value_at(SUGAR, index, index as f32 / 25.0)
            .expect("valid edit");
    }
    let before = query::field(&simulator, SUGAR)
        .expect("field exists")
        .to_vec();

    for _ in 0..20 {
        let _ = simulator.one_step();
    }

    assert_eq!(query::field(&simulator, SUGAR), Some(before.as_slice()));
}

#[test]
fn field_values_stay_within_bounds() {
    let lattice = Lattice::planar(6, 6).expect("valid lattice");
    let model = RuleModel::new(
        vec![Grain::new(A)
            .with_movement(0.6, DirectionSet::EIGHT)
            .with_field(FieldCoefficients::new(SUGAR).with_production(0.9))],
        vec![Field::new(SUGAR)
            .with_diffusion(0.9, DirectionSet::EIGHT)
            .with_half_life(3.0)],
        Vec::new(),
    );
    let mut layout = vec![None; lattice.data_size()];
    layout[7] = Some(A);
    layout[20] = Some(A);
    let hook = |step: u64, position: Position, current: f32| -> Result<f32, EvaluatorError> {
        match (step + u64::from(position.x())) % 3 {
            0 => Ok(current * 40.0),
            1 => Ok(-current),
            _ => Err(EvaluatorError::new("unsupported cell")),
        }
    };
    let mut simulator = Simulator::seeded(&model, lattice, layout, 9)
        .expect("valid model")
        .with_field_evaluator(SUGAR, hook)
        .expect("field exists");

    for _ in 0..30 {
        let _ = simulator.one_step();
        let values = query::field(&simulator, SUGAR).expect("field exists");
        assert!(values
            .iter()
            .all(|value| (MIN_FIELD..=1.0).contains(value)));
    }
}

#[test]
fn evaluator_output_replaces_diffused_values() {
    let lattice = Lattice::planar(4, 4).expect("valid lattice");
    let model = RuleModel::new(
        Vec::new(),
        vec![Field::new(SUGAR).with_formula("0.5")],
        Vec::new(),
    );
    let mut simulator = Simulator::seeded(&model, lattice, vec![None; 16], 1)
        .expect("valid model")
        .with_field_evaluator(
            SUGAR,
            |_step: u64, _position: Position, _current: f32| -> Result<f32, EvaluatorError> {
                Ok(0.5)
            },
        )
        .expect("field exists");

    let _ = simulator.one_step();

    assert!(query::field(&simulator, SUGAR)
        .expect("field exists")
        .iter()
        .all(|value| *value == 0.5));
    let history = query::field_history(&simulator, SUGAR).expect("field recorded");
    assert_eq!(history.len(), 2);
    assert!((history[1] - 8.0).abs() < 1e-9);
    assert!((query::max_field_amount(&simulator) - 8.0).abs() < 1e-9);
}

#[test]
fn commands_drive_the_simulator() {
    let lattice = Lattice::planar(3, 3).expect("valid lattice");
    let mut simulator =
        Simulator::seeded(&spreading_model(), lattice, vec![None; 9], 0).expect("valid model");
    let mut events = Vec::new();

    world::apply(
        &mut simulator,
        Command::PlaceGrain { index: 4, grain: A },
        &mut events,
    );
    world::apply(&mut simulator, Command::Step, &mut events);
    world::apply(&mut simulator, Command::Reset, &mut events);

    assert_eq!(events.len(), 3);
    assert!(matches!(
        events[1],
        Event::StepCompleted { report } if report.applied == 1
    ));
    assert_eq!(events[2], Event::SimulationReset);
    assert_eq!(query::population(&simulator, A), 0);
    assert_eq!(query::step(&simulator), 0);
    assert!(query::last_report(&simulator).is_none());
}
