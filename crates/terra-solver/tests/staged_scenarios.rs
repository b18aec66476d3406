//! Staged construction and safety analysis scenarios.

mod common;

use common::{nodal_at, rect_mesh};
use terra_model::{
    Load, LoadId, Material, MaterialId, MaterialSet, Phase, PhaseId, PhaseKind, PhaseTree,
    PolygonTag, SolverSettings,
};
use terra_solver::{CancelToken, NullSink, PhaseDriver, RecordingSink};

fn full_load_settings() -> SolverSettings {
    SolverSettings {
        max_load_fraction: 1.0,
        ..Default::default()
    }
}

/// Staged embankment: K0 on the ground, then fill activation, then a
/// surface load. Maximum displacement and the active element count are
/// both non-decreasing along the branch.
#[test]
fn staged_embankment_grows_monotonically() {
    // 4 m wide, 4 m tall; lower half is ground (tag 0), upper half is
    // fill (tag 1).
    let mesh = rect_mesh(2, 2, 4.0, 4.0, MaterialId(0), |_, cy| {
        if cy == 0 { PolygonTag(0) } else { PolygonTag(1) }
    });
    let mut materials = MaterialSet::new();
    materials.insert(
        Material::mohr_coulomb(MaterialId(0), "ground", 30_000.0, 0.3, 50.0, 30.0, 0.0)
            .with_unit_weights(20.0, 18.0),
    );

    let loads = vec![Load::Line {
        id: LoadId(0),
        p1: [0.0, 4.0],
        p2: [4.0, 4.0],
        force: [0.0, -20.0],
    }];

    let mut tree = PhaseTree::new();
    tree.push(
        Phase::new(PhaseId(0), "initial", PhaseKind::K0Procedure)
            .with_polygons([PolygonTag(0)]),
    )
    .unwrap();
    tree.push(
        Phase::new(PhaseId(1), "fill", PhaseKind::Plastic)
            .with_parent(PhaseId(0))
            .with_polygons([PolygonTag(0), PolygonTag(1)]),
    )
    .unwrap();
    tree.push(
        Phase::new(PhaseId(2), "surcharge", PhaseKind::Plastic)
            .with_parent(PhaseId(1))
            .with_polygons([PolygonTag(0), PolygonTag(1)])
            .with_loads([LoadId(0)]),
    )
    .unwrap();

    let driver = PhaseDriver::new(
        &mesh,
        &materials,
        &loads,
        &[],
        &tree,
        full_load_settings(),
    )
    .unwrap();
    let mut sink = RecordingSink::default();
    let outcome = driver.run(&mut sink, &CancelToken::new()).unwrap();
    assert!(outcome.all_successful, "some phase failed");

    let [initial, fill, surcharge] = &outcome.results[..] else {
        panic!("expected three results");
    };
    // Displacement grows (or holds) across the branch.
    assert!(initial.max_displacement() < 1e-12);
    assert!(fill.max_displacement() > 1e-6);
    assert!(surcharge.max_displacement() >= fill.max_displacement() - 1e-12);

    // Active integration points are non-decreasing: ground only, then
    // ground plus fill.
    assert_eq!(initial.gp_state.len(), 4 * 3);
    assert_eq!(fill.gp_state.len(), 8 * 3);
    assert_eq!(surcharge.gp_state.len(), 8 * 3);

    // The fill phase reports the previously inactive nodes as floating.
    assert!(!initial.floating_nodes.is_empty());
    assert!(fill.floating_nodes.is_empty());

    // Step points were streamed in phase order, monotonic per phase.
    let mut last_phase = 0usize;
    let mut last_step = 0usize;
    for (phase_index, point) in &sink.step_points {
        if *phase_index != last_phase {
            assert!(*phase_index > last_phase);
            last_phase = *phase_index;
            last_step = 0;
        }
        assert!(point.step > last_step);
        last_step = point.step;
    }
}

/// Safety analysis on an elastic state never finds failure: sum-Msf runs
/// up to the cap and the trace is monotonic.
#[test]
fn safety_analysis_hits_cap_without_yield() {
    let mesh = rect_mesh(1, 1, 2.0, 2.0, MaterialId(0), |_, _| PolygonTag(0));
    let mut materials = MaterialSet::new();
    materials.insert(
        Material::elastic(MaterialId(0), "rock", 50_000.0, 0.25).with_unit_weights(22.0, 22.0),
    );

    let mut tree = PhaseTree::new();
    tree.push(
        Phase::new(PhaseId(0), "initial", PhaseKind::K0Procedure)
            .with_polygons([PolygonTag(0)]),
    )
    .unwrap();
    tree.push(
        Phase::new(PhaseId(1), "safety", PhaseKind::SafetyAnalysis).with_parent(PhaseId(0)),
    )
    .unwrap();

    let settings = SolverSettings {
        max_safety_factor: 3.0,
        ..full_load_settings()
    };
    let driver = PhaseDriver::new(&mesh, &materials, &[], &[], &tree, settings).unwrap();
    let outcome = driver.run(&mut NullSink, &CancelToken::new()).unwrap();
    assert!(outcome.all_successful);

    let safety = &outcome.results[1];
    assert!(safety.success);
    // No plasticity anywhere, so the cap is reached.
    assert_eq!(safety.safety_factor, Some(3.0));
    assert!((safety.reached_load_factor - 3.0).abs() < 1e-9);
    // The sum-Msf trace starts above 1 and increases monotonically.
    assert!(!safety.step_points.is_empty());
    let mut last = 1.0;
    for point in &safety.step_points {
        assert!(point.load_factor > last - 1e-12);
        last = point.load_factor;
    }
}

/// Safety analysis of a loaded Mohr-Coulomb block: the factor of safety
/// is finite, above one, and the step-point trace rises then stalls at
/// the reported value.
#[test]
fn safety_analysis_reports_finite_factor() {
    let mesh = rect_mesh(2, 1, 4.0, 2.0, MaterialId(0), |_, _| PolygonTag(0));
    let mut materials = MaterialSet::new();
    // Weak cohesive soil under its own weight plus a surcharge.
    materials.insert(
        Material::mohr_coulomb(MaterialId(0), "soft", 10_000.0, 0.3, 10.0, 20.0, 0.0)
            .with_unit_weights(18.0, 17.0),
    );
    let loads = vec![Load::Line {
        id: LoadId(0),
        p1: [0.0, 2.0],
        p2: [4.0, 2.0],
        force: [0.0, -30.0],
    }];

    let mut tree = PhaseTree::new();
    tree.push(
        Phase::new(PhaseId(0), "initial", PhaseKind::K0Procedure)
            .with_polygons([PolygonTag(0)]),
    )
    .unwrap();
    tree.push(
        Phase::new(PhaseId(1), "load", PhaseKind::Plastic)
            .with_parent(PhaseId(0))
            .with_polygons([PolygonTag(0)])
            .with_loads([LoadId(0)]),
    )
    .unwrap();
    tree.push(
        Phase::new(PhaseId(2), "safety", PhaseKind::SafetyAnalysis).with_parent(PhaseId(1)),
    )
    .unwrap();

    let settings = SolverSettings {
        max_safety_factor: 10.0,
        ..full_load_settings()
    };
    let driver = PhaseDriver::new(&mesh, &materials, &loads, &[], &tree, settings).unwrap();
    let outcome = driver.run(&mut NullSink, &CancelToken::new()).unwrap();

    let safety = outcome.results.last().unwrap();
    assert!(safety.success);
    let fos = safety.safety_factor.expect("safety factor reported");
    assert!(fos >= 1.0, "factor of safety {fos}");
    assert!(fos <= 10.0);
    // The trace is monotonic in sum-Msf.
    let mut last = 1.0;
    for point in &safety.step_points {
        assert!(point.load_factor >= last - 1e-12);
        last = point.load_factor;
    }
    // The reported factor matches the last converged trace point.
    if let Some(last_point) = safety.step_points.last() {
        assert!((last_point.load_factor - fos).abs() < 1e-9);
    }
}

/// The factor of safety is invariant under a uniform scaling of all
/// loads. With a weightless cohesionless material the yield surface is a
/// cone through the stress origin, so the whole stress path scales
/// linearly with the load and the strength reduction at which
/// equilibrium is lost does not depend on the load magnitude. The scale
/// factor is a power of two so the two runs stay comparable to floating
/// point precision.
#[test]
fn safety_factor_invariant_under_load_scaling() {
    let run = |scale: f64| {
        let mesh = rect_mesh(2, 1, 4.0, 2.0, MaterialId(0), |_, _| PolygonTag(0));
        let mut materials = MaterialSet::new();
        let mut sand =
            Material::mohr_coulomb(MaterialId(0), "sand", 30_000.0, 0.3, 0.0, 35.0, 0.0);
        // Weightless: the applied surcharge is the only action, so every
        // stress in the solution is proportional to it.
        sand.gamma_sat = 0.0;
        sand.gamma_unsat = 0.0;
        materials.insert(sand);

        let loads = vec![Load::Line {
            id: LoadId(0),
            p1: [0.0, 2.0],
            p2: [4.0, 2.0],
            force: [0.0, -50.0 * scale],
        }];
        let mut tree = PhaseTree::new();
        tree.push(
            Phase::new(PhaseId(0), "load", PhaseKind::Plastic)
                .with_polygons([PolygonTag(0)])
                .with_loads([LoadId(0)]),
        )
        .unwrap();
        tree.push(
            Phase::new(PhaseId(1), "safety", PhaseKind::SafetyAnalysis).with_parent(PhaseId(0)),
        )
        .unwrap();

        let settings = SolverSettings {
            max_safety_factor: 2.5,
            ..full_load_settings()
        };
        let driver = PhaseDriver::new(&mesh, &materials, &loads, &[], &tree, settings).unwrap();
        let outcome = driver.run(&mut NullSink, &CancelToken::new()).unwrap();
        let safety = outcome.results.last().unwrap();
        assert!(safety.success, "safety phase failed at scale {scale}");
        safety.safety_factor.expect("safety factor reported")
    };

    let base = run(1.0);
    let doubled = run(2.0);
    assert!(base > 1.0, "factor of safety {base}");
    assert!(base <= 2.5);
    assert!(
        (base - doubled).abs() < 1e-6 * base,
        "factor of safety changed under load scaling: {base} vs {doubled}"
    );
}

/// Central strip load on a wide block: the settlement trough is deepest
/// under the strip, symmetric, and decays toward the edges.
#[test]
fn strip_footing_settlement_trough() {
    let width = 20.0;
    let height = 10.0;
    let mesh = rect_mesh(10, 5, width, height, MaterialId(0), |_, _| PolygonTag(0));
    let mut materials = MaterialSet::new();
    let mut mat = Material::elastic(MaterialId(0), "soil", 30_000.0, 0.3);
    mat.gamma_sat = 0.0;
    mat.gamma_unsat = 0.0;
    materials.insert(mat);

    // 100 kN/m over the central 4 m (x in [8, 12], aligned with mesh
    // edges).
    let loads = vec![Load::Line {
        id: LoadId(0),
        p1: [8.0, height],
        p2: [12.0, height],
        force: [0.0, -100.0],
    }];
    let mut tree = PhaseTree::new();
    tree.push(
        Phase::new(PhaseId(0), "strip", PhaseKind::Plastic)
            .with_polygons([PolygonTag(0)])
            .with_loads([LoadId(0)]),
    )
    .unwrap();

    let driver = PhaseDriver::new(
        &mesh,
        &materials,
        &loads,
        &[],
        &tree,
        full_load_settings(),
    )
    .unwrap();
    let outcome = driver.run(&mut NullSink, &CancelToken::new()).unwrap();
    let result = &outcome.results[0];
    assert!(result.success);

    let center = nodal_at(&mesh, result, 10.0, height).unwrap();
    let shoulder = nodal_at(&mesh, result, 6.0, height).unwrap();
    let far_edge = nodal_at(&mesh, result, 0.0, height).unwrap();
    // Settlement under the strip, decaying away from it.
    assert!(center.uy < 0.0);
    assert!(center.uy < shoulder.uy);
    assert!(shoulder.uy < far_edge.uy + 1e-12);
    // Near-symmetry about the strip centerline (the diagonal split of
    // the structured mesh leaves a small discretization asymmetry).
    let mirrored = nodal_at(&mesh, result, 14.0, height).unwrap();
    let partner = nodal_at(&mesh, result, 6.0, height).unwrap();
    assert!((mirrored.uy - partner.uy).abs() < 0.05 * center.uy.abs());
    // The maximum displacement in the whole mesh occurs at the surface
    // under the strip.
    let max = result.max_displacement();
    assert!((center.uy.abs() - max).abs() < 1e-9 + 0.2 * max);
}
