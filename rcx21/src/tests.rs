//!
//! # rcx21 unit tests
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::models::{
    DiagModel, DistanceSample, PatternSample, RcModel, RelationKind, RuleOptions, RuleOptionsBuilder, SweepBuilder,
    INFINITE_SEPARATION,
};
use crate::utils::{SerdeFile, SerializationFormat};

/// Install a test logger, ignoring repeat installs
fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}
/// Approximate float equality
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
fn all_close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| close(*x, *y))
}

///
/// Two-corner model of a three-layer stack, 100nm wires only.
///
/// Corner `k` (one-based) couples at `0.2k` per nm at 100nm separation.
/// Fringe is 0.1 over any layer, 0.3 under any layer.
/// Resistance is 2.0 throughout. Diagonal coupling, when modeled, is `0.04k` at 100nm.
///
fn flat_model(diag_model: DiagModel) -> ExtractResult<RcModel> {
    let options = RuleOptionsBuilder::default().diag_model(diag_model).build()?;
    let mut sweep = SweepBuilder::new(4, vec![0.0, 0.5], options);
    for corner in 0..2 {
        let k = 1.0 + corner as f64;
        let rows = [(100, 0.2 * k), (200, 0.1 * k), (INFINITE_SEPARATION, 0.0)];
        let base = PatternSample {
            corner,
            met: 1,
            kind: RelationKind::Over,
            under: None,
            over: None,
            width: 100,
            diag: None,
            sample: DistanceSample::default(),
        };
        for met in 1..4 {
            for &(sep, cc) in rows.iter() {
                for under in 0..met {
                    sweep.add(PatternSample {
                        met,
                        under: Some(under),
                        sample: DistanceSample::new(sep, cc, 0.1, 2.0),
                        ..base
                    })?;
                }
                for over in met + 1..4 {
                    sweep.add(PatternSample {
                        met,
                        kind: RelationKind::Under,
                        over: Some(over),
                        sample: DistanceSample::new(sep, cc, 0.3, 2.0),
                        ..base
                    })?;
                }
            }
            if diag_model == DiagModel::None {
                continue;
            }
            for over in met + 1..4 {
                for &(sep, diag) in [(100, 0.04 * k), (INFINITE_SEPARATION, 0.0)].iter() {
                    sweep.add(PatternSample {
                        met,
                        kind: RelationKind::DiagUnder,
                        over: Some(over),
                        sample: DistanceSample::new(sep, 0.0, 0.0, 0.0).with_diagonal(diag),
                        ..base
                    })?;
                }
            }
        }
    }
    Ok(sweep.build()?)
}

///
/// Single-corner model of M1 over the substrate, 100nm wires only.
///
/// Fringe grows with separation: 0.02 per nm at 100nm, 0.06 at 200nm, 0.1 isolated.
/// Coupling is 0.2 per nm at 100nm.
///
fn graded_model() -> ExtractResult<RcModel> {
    let mut sweep = SweepBuilder::new(4, vec![0.0], RuleOptions::default());
    let rows = [(100, 0.2, 0.02), (200, 0.1, 0.06), (INFINITE_SEPARATION, 0.0, 0.1)];
    for &(sep, cc, fr) in rows.iter() {
        sweep.add(PatternSample {
            corner: 0,
            met: 1,
            kind: RelationKind::Over,
            under: Some(0),
            over: None,
            width: 100,
            diag: None,
            sample: DistanceSample::new(sep, cc, fr, 2.0),
        })?;
    }
    Ok(sweep.build()?)
}

/// Three-layer stack: horizontal M1 and M3, vertical M2
fn stack() -> LayerStack {
    LayerStack::new(vec![
        LayerInfo::new(1, "M1", Dir::Horiz, 200, 100),
        LayerInfo::new(2, "M2", Dir::Vert, 250, 100),
        LayerInfo::new(3, "M3", Dir::Horiz, 300, 100),
    ])
}

/// Horizontal 1000nm-long, 100nm-wide wire on `layer`, bottom edge at `y`
fn hwire(design: &mut Design, wire: usize, net: usize, layer: usize, y: Int) -> ShapeId {
    design.add_wire(wire, net, layer, Dir::Horiz, Rect::from_coords(0, y, 1000, y + 100))
}

#[test]
fn it_extracts_parallel_wires() -> ExtractResult<()> {
    init_log();
    let mut design = Design::new("parallel", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 1, 200);

    let extractor = Extractor::new(flat_model(DiagModel::None)?, ExtractOptions::default())?;
    assert_eq!(extractor.corners(), &[0, 1]);
    let mut parasitics = Parasitics::new(extractor.rates());
    let stats = extractor.run(&design, &mut parasitics, None)?;
    assert_eq!(stats.wires, 2);
    assert_eq!(stats.couplings, 1);
    assert_eq!(stats.window.shapes, 2);
    assert_eq!(stats.window.pairs, 1);
    assert_eq!(stats.rates, vec![0.0, 0.5]);

    for w in 0..2 {
        let wire = WireId(w);
        assert!(all_close(parasitics.ground(wire).unwrap(), &[100.0, 100.0]));
        assert!(all_close(parasitics.resistance(wire).unwrap(), &[2000.0, 2000.0]));
    }
    let cc = parasitics.coupling(WireId(1), WireId(0)).unwrap();
    assert!(all_close(cc, &[200.0, 400.0]));
    assert_eq!(parasitics.coupling_count(), 1);
    assert!(all_close(&parasitics.total_coupling(WireId(0)), &[200.0, 400.0]));
    Ok(())
}

#[test]
fn it_halves_same_net_fringe() -> ExtractResult<()> {
    let mut design = Design::new("same_net", stack());
    hwire(&mut design, 0, 7, 1, 0);
    hwire(&mut design, 1, 7, 1, 200);
    let extractor = Extractor::new(flat_model(DiagModel::None)?, ExtractOptions::default())?;
    let parasitics = extractor.extract(&design)?;
    // Open side: half of 100. Neighbor side: half of the halved 0.1 fringe, over 1000nm.
    assert!(all_close(parasitics.ground(WireId(0)).unwrap(), &[75.0, 75.0]));
    assert!(all_close(parasitics.ground(WireId(1)).unwrap(), &[75.0, 75.0]));
    assert_eq!(parasitics.coupling_count(), 0);
    Ok(())
}

#[test]
fn it_replaces_isolated_fringe_with_neighbor_fringe() -> ExtractResult<()> {
    let extractor = Extractor::new(graded_model()?, ExtractOptions::default())?;
    let ground = |p: &Parasitics, w: usize| p.ground(WireId(w)).unwrap()[0];

    // Isolated
    let mut design = Design::new("isolated", stack());
    hwire(&mut design, 0, 0, 1, 0);
    let parasitics = extractor.extract(&design)?;
    assert!(close(ground(&parasitics, 0), 100.0));

    // Different nets, 100nm apart: one open side, one side at 0.02
    let mut design = Design::new("neighbors", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 1, 200);
    let parasitics = extractor.extract(&design)?;
    assert!(close(ground(&parasitics, 0), 60.0));
    assert!(close(ground(&parasitics, 1), 60.0));
    assert!(all_close(parasitics.coupling(WireId(0), WireId(1)).unwrap(), &[200.0]));

    // Same net: the neighbor side's fringe is halved, and nothing couples
    let mut design = Design::new("same_net", stack());
    hwire(&mut design, 0, 3, 1, 0);
    hwire(&mut design, 1, 3, 1, 200);
    let parasitics = extractor.extract(&design)?;
    assert!(close(ground(&parasitics, 0), 55.0));
    assert!(close(ground(&parasitics, 1), 55.0));
    assert_eq!(parasitics.coupling_count(), 0);

    // Neighbors on both sides. The nearer neighbor shadows the farther one.
    let mut design = Design::new("three", stack());
    for i in 0..3 {
        hwire(&mut design, i, i, 1, i as Int * 200);
    }
    let parasitics = extractor.extract(&design)?;
    assert!(close(ground(&parasitics, 0), 60.0));
    assert!(close(ground(&parasitics, 1), 20.0));
    assert!(close(ground(&parasitics, 2), 60.0));

    // Partial overlap: isolated fringe beyond the neighbor's end
    let mut design = Design::new("partial", stack());
    hwire(&mut design, 0, 0, 1, 0);
    design.add_wire(1, 1, 1, Dir::Horiz, Rect::from_coords(0, 200, 500, 300));
    let parasitics = extractor.extract(&design)?;
    assert!(close(ground(&parasitics, 0), 50.0 + 0.5 * (0.02 * 500.0 + 0.1 * 500.0)));
    assert!(close(ground(&parasitics, 1), 25.0 + 5.0));
    assert!(all_close(parasitics.coupling(WireId(0), WireId(1)).unwrap(), &[100.0]));
    Ok(())
}

#[test]
fn it_extracts_vias() -> ExtractResult<()> {
    init_log();
    let mut layers = stack();
    layers.layers[0] = layers.layers[0].clone().with_via_resistance(5.0);
    let mut design = Design::new("vias", layers);
    hwire(&mut design, 0, 0, 1, 0);
    // Via of another net beside wire 0, 100nm away
    design.add_via(1, 1, 1, Rect::from_coords(400, 200, 500, 300));
    // Via on wire 0's own net and wire, atop it
    design.add_via(0, 0, 1, Rect::from_coords(900, 0, 1000, 100));

    let extractor = Extractor::new(flat_model(DiagModel::None)?, ExtractOptions::default())?;
    let mut parasitics = Parasitics::new(extractor.rates());
    let stats = extractor.run(&design, &mut parasitics, None)?;
    assert_eq!(stats.window.shapes, 3);
    assert_eq!(stats.wires, 2);

    // One cut each, charged once across both passes
    assert!(all_close(parasitics.resistance(WireId(1)).unwrap(), &[5.0, 5.0]));
    assert!(all_close(parasitics.resistance(WireId(0)).unwrap(), &[2005.0, 2005.0]));
    // Coupling over the via's 100nm, in the wire's context
    assert!(all_close(
        parasitics.coupling(WireId(0), WireId(1)).unwrap(),
        &[20.0, 40.0]
    ));
    // Vias carry no ground
    assert!(parasitics.ground(WireId(1)).is_none());
    assert!(all_close(parasitics.ground(WireId(0)).unwrap(), &[100.0, 100.0]));
    Ok(())
}

#[test]
fn it_reports_via_pairs_once() -> ExtractResult<()> {
    // Overlapping vias of different wires, paired along both axes
    let mut design = Design::new("via_pairs", stack());
    design.add_via(0, 0, 1, Rect::from_coords(0, 0, 100, 100));
    design.add_via(1, 1, 1, Rect::from_coords(50, 50, 150, 150));
    hwire(&mut design, 2, 2, 1, 300);
    let mut engine = SpatialWindowEngine::new(WindowOptions::default());
    let mut recorder = Recorder::default();
    let stats = engine.run(&design, &mut recorder, None)?;
    assert_eq!(recorder.shapes, vec![ShapeId(0), ShapeId(1), ShapeId(2)]);
    let mut pairs = recorder.pairs.clone();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![(ShapeId(0), ShapeId(1)), (ShapeId(0), ShapeId(2)), (ShapeId(1), ShapeId(2))]
    );
    assert_eq!(stats.pairs, 3);
    // Vias are released once per pass, wires once
    let mut released = recorder.released.clone();
    released.sort();
    assert_eq!(
        released,
        vec![ShapeId(0), ShapeId(0), ShapeId(1), ShapeId(1), ShapeId(2)]
    );
    Ok(())
}

#[test]
fn it_couples_adjacent_layers() -> ExtractResult<()> {
    // Stacked: the lower wire's Under plate value
    let mut design = Design::new("stacked", stack());
    hwire(&mut design, 0, 0, 1, 0);
    design.add_wire(1, 1, 2, Dir::Horiz, Rect::from_coords(200, 0, 700, 100));
    let extractor = Extractor::new(flat_model(DiagModel::Simple)?, ExtractOptions::default())?;
    let parasitics = extractor.extract(&design)?;
    let cc = parasitics.coupling(WireId(0), WireId(1)).unwrap();
    assert!(all_close(cc, &[150.0, 150.0]));

    // Offset: diagonal coupling at the sweep-axis gap
    let mut design = Design::new("diagonal", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 2, 200);
    let parasitics = extractor.extract(&design)?;
    let cc = parasitics.coupling(WireId(0), WireId(1)).unwrap();
    assert!(all_close(cc, &[40.0, 80.0]));

    // Without diagonal tables, offset neighbors do not couple
    let extractor = Extractor::new(flat_model(DiagModel::None)?, ExtractOptions::default())?;
    let parasitics = extractor.extract(&design)?;
    assert!(parasitics.coupling(WireId(0), WireId(1)).is_none());

    // Nor do wires on layers two apart
    let mut design = Design::new("distant", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 3, 0);
    let parasitics = extractor.extract(&design)?;
    assert_eq!(parasitics.coupling_count(), 0);
    Ok(())
}

#[test]
fn it_selects_rates() -> ExtractResult<()> {
    let mut design = Design::new("rates", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 1, 200);
    let options = ExtractOptionsBuilder::default().rates(vec![0.4, 0.0]).build()?;
    let extractor = Extractor::new(flat_model(DiagModel::None)?, options)?;
    assert_eq!(extractor.corners(), &[1, 0]);
    assert_eq!(extractor.rates(), vec![0.5, 0.0]);
    let parasitics = extractor.extract(&design)?;
    assert_eq!(parasitics.rates, vec![0.5, 0.0]);
    let cc = parasitics.coupling(WireId(0), WireId(1)).unwrap();
    assert!(all_close(cc, &[400.0, 200.0]));
    Ok(())
}

#[test]
fn it_requires_a_usable_model() -> ExtractResult<()> {
    let no_rules = Extractor::load(&ExtractOptions::default());
    assert!(matches!(no_rules, Err(ExtractError::NoModel(_))));

    let empty = RcModel::new(4, Vec::new(), RuleOptions::default());
    let no_corners = Extractor::new(empty, ExtractOptions::default());
    assert!(matches!(no_corners, Err(ExtractError::NoModel(_))));

    let nan = ExtractOptionsBuilder::default().rates(vec![f64::NAN]).build()?;
    let no_rate = Extractor::new(flat_model(DiagModel::None)?, nan);
    assert!(matches!(no_rate, Err(ExtractError::NoModel(_))));

    let none = ExtractOptionsBuilder::default().rates(Vec::<f64>::new()).build()?;
    assert!(matches!(
        Extractor::new(flat_model(DiagModel::None)?, none),
        Err(ExtractError::NoModel(_))
    ));

    let missing = ExtractOptionsBuilder::default().rules("/nonexistent/rules.txt").build()?;
    assert!(matches!(Extractor::load(&missing), Err(ExtractError::Model(_))));
    Ok(())
}

#[test]
fn it_loads_rule_files() -> ExtractResult<()> {
    init_log();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rules.txt");
    flat_model(DiagModel::None)?.save_rules(&path)?;

    let mut design = Design::new("loaded", stack());
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 1, 200);
    let options = ExtractOptionsBuilder::default().rules(path).build()?;
    let extractor = Extractor::load(&options)?;
    assert_eq!(extractor.model().corner_count(), 2);
    let parasitics = extractor.extract(&design)?;
    let cc = parasitics.coupling(WireId(0), WireId(1)).unwrap();
    assert!(all_close(cc, &[200.0, 400.0]));
    Ok(())
}

#[test]
fn it_reads_extract_options() -> ExtractResult<()> {
    let options: ExtractOptions = SerializationFormat::Yaml.from_str(
        r#"
        rules: tech/rules.txt
        rates: [0.25]
        window:
          coupling_distance: 3
        rule_options:
          diag_model: Full
        "#,
    )?;
    assert_eq!(options.rules, Some("tech/rules.txt".into()));
    assert_eq!(options.rates, Some(vec![0.25]));
    assert_eq!(options.window.coupling_distance, 3);
    assert_eq!(options.window.step_tracks, DEFAULT_STEP_TRACKS);
    assert_eq!(options.rule_options.diag_model, DiagModel::Full);
    assert_eq!(options.scale_resistance, None);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("options.json");
    options.save(SerializationFormat::Json, &path)?;
    assert_eq!(ExtractOptions::open_any(&path)?, options);
    Ok(())
}

/// Window visitor recording what it is shown
#[derive(Debug, Default)]
struct Recorder {
    shapes: Vec<ShapeId>,
    pairs: Vec<(ShapeId, ShapeId)>,
    released: Vec<ShapeId>,
}
impl WindowVisitor for Recorder {
    fn visit_shape(&mut self, shape: &Shape) -> ExtractResult<()> {
        self.shapes.push(shape.id);
        Ok(())
    }
    fn visit_pair(&mut self, pair: &CouplingPair) -> ExtractResult<()> {
        assert!(pair.a.id < pair.b.id);
        assert!(pair.overlap > 0);
        self.pairs.push((pair.a.id, pair.b.id));
        Ok(())
    }
    fn release_shape(&mut self, shape: &Shape) -> ExtractResult<()> {
        // Wires leave the window once
        assert!(!self.released.contains(&shape.id) || shape.is_via());
        self.released.push(shape.id);
        Ok(())
    }
}

/// Random wires across a 20um die, seeded
fn random_design(seed: u64, count: usize) -> Design {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut design = Design::new("random", stack());
    design.die = Some(Rect::from_coords(0, 0, 20_000, 20_000));
    for _ in 0..count {
        let wire = rng.gen_range(0..count / 2);
        let layer = rng.gen_range(1..=3);
        let dir = if rng.gen_bool(0.5) { Dir::Horiz } else { Dir::Vert };
        let lo = rng.gen_range(0..18_000);
        let len = rng.gen_range(100..2_000);
        let edge = rng.gen_range(0..19_800);
        let width = rng.gen_range(50..200);
        let rect = match dir {
            Dir::Horiz => Rect::from_coords(lo, edge, lo + len, edge + width),
            Dir::Vert => Rect::from_coords(edge, lo, edge + width, lo + len),
        };
        design.add_wire(wire, wire % 17, layer, dir, rect);
    }
    design
}

/// All coupled pairs, by exhaustive comparison
fn brute_force_pairs(design: &Design, reach: Int) -> Vec<(ShapeId, ShapeId)> {
    let mut pairs = Vec::new();
    for (i, a) in design.shapes.iter().enumerate() {
        for b in design.shapes[i + 1..].iter() {
            if a.dir != b.dir || a.wire == b.wire {
                continue;
            }
            let dl = (a.layer as isize - b.layer as isize).abs();
            if dl > 1 {
                continue;
            }
            let gap = a.sweep_span().gap(&b.sweep_span());
            let overlap = a.wire_span().overlap(&b.wire_span());
            if gap <= reach && overlap > 0 {
                pairs.push((a.id.min(b.id), a.id.max(b.id)));
            }
        }
    }
    pairs.sort();
    pairs
}

#[test]
fn it_visits_every_pair_once() -> ExtractResult<()> {
    init_log();
    for seed in 0..4 {
        let design = random_design(seed, 400);
        let options = WindowOptionsBuilder::default()
            .coupling_distance(2usize)
            .step_tracks(3usize)
            .build()?;
        let mut engine = SpatialWindowEngine::new(options);
        let mut recorder = Recorder::default();
        let stats = engine.run(&design, &mut recorder, None)?;
        assert_eq!(engine.state(), WindowState::Done);
        assert_eq!(engine.reach(), 600);

        // Every shape, once
        let mut shapes = recorder.shapes.clone();
        shapes.sort();
        shapes.dedup();
        assert_eq!(shapes.len(), design.shapes.len());
        assert_eq!(recorder.shapes.len(), design.shapes.len());
        assert_eq!(stats.shapes, design.shapes.len());
        let mut released = recorder.released.clone();
        released.sort();
        assert_eq!(released, shapes);

        // Every pair, once
        let mut pairs = recorder.pairs.clone();
        pairs.sort();
        let unique: HashSet<_> = pairs.iter().copied().collect();
        assert_eq!(unique.len(), pairs.len());
        assert_eq!(pairs, brute_force_pairs(&design, engine.reach()));
        assert_eq!(stats.pairs, pairs.len());
        assert!(stats.windows > 2);
    }
    Ok(())
}

#[test]
fn it_bounds_live_shapes() -> ExtractResult<()> {
    // 2000 parallel wires at 200nm pitch, 100nm apart
    let mut design = Design::new("bus", stack());
    for i in 0..2000 {
        hwire(&mut design, i, i, 1, i as Int * 200);
    }
    let options = WindowOptionsBuilder::default()
        .coupling_distance(2usize)
        .step_tracks(2usize)
        .build()?;
    let mut engine = SpatialWindowEngine::new(options);
    let mut recorder = Recorder::default();
    let stats = engine.run(&design, &mut recorder, None)?;
    assert_eq!(stats.shapes, 2000);
    // Reach is two of M3's 300nm tracks: neighbors up to three wires away
    assert_eq!(stats.pairs, 1999 + 1998 + 1997);
    assert!(stats.peak_live <= 12, "peak live {}", stats.peak_live);
    assert_eq!(engine.live(), 0);
    Ok(())
}

#[test]
fn it_skips_unusable_layers() -> ExtractResult<()> {
    init_log();
    let mut layers = stack();
    layers.layers[1].pitch = 0;
    let mut design = Design::new("unusable", layers);
    hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 1, 2, 0);
    hwire(&mut design, 2, 2, 2, 200);
    let mut engine = SpatialWindowEngine::new(WindowOptions::default());
    let mut recorder = Recorder::default();
    let stats = engine.run(&design, &mut recorder, None)?;
    assert_eq!(recorder.shapes, vec![ShapeId(0)]);
    assert_eq!(stats.pairs, 0);
    assert_eq!(engine.reach(), DEFAULT_COUPLING_DISTANCE as Int * 300);

    // No usable layers at all
    let mut layers = stack();
    for l in layers.layers.iter_mut() {
        l.width = 0;
    }
    let design = Design::new("nothing", layers);
    let stats = SpatialWindowEngine::new(WindowOptions::default()).run(&design, &mut recorder, None)?;
    assert_eq!(stats, WindowStats::default());
    Ok(())
}

#[test]
fn it_cancels() -> ExtractResult<()> {
    let design = random_design(11, 50);
    let cancel = Cancel::new();
    let flag = cancel.clone();
    flag.cancel();
    assert!(cancel.is_cancelled());

    let mut engine = SpatialWindowEngine::new(WindowOptions::default());
    let mut recorder = Recorder::default();
    let result = engine.run(&design, &mut recorder, Some(&cancel));
    assert!(matches!(result, Err(ExtractError::Cancelled)));

    let extractor = Extractor::new(flat_model(DiagModel::None)?, ExtractOptions::default())?;
    let mut parasitics = Parasitics::default();
    let result = extractor.run(&design, &mut parasitics, Some(&cancel));
    assert!(matches!(result, Err(ExtractError::Cancelled)));

    // Uncancelled flags have no effect
    let result = extractor.run(&design, &mut parasitics, Some(&Cancel::new()));
    assert!(result.is_ok());
    Ok(())
}

#[test]
fn it_steps_through_states() -> ExtractResult<()> {
    let mut design = Design::new("steps", stack());
    hwire(&mut design, 0, 0, 1, 0);
    let mut engine = SpatialWindowEngine::new(WindowOptions::default());
    let mut recorder = Recorder::default();
    let mut states = vec![engine.state()];
    while engine.state() != WindowState::Done {
        states.push(engine.step(&design, &mut recorder, None)?);
    }
    use WindowState::*;
    // One window per pass, horizontal then vertical
    assert_eq!(
        states,
        vec![Init, Fill, Process, Advance, Fill, Process, Advance, Done]
    );
    assert_eq!(engine.stats().windows, 2);
    assert_eq!(recorder.shapes, vec![ShapeId(0)]);
    Ok(())
}

#[test]
fn it_resolves_measurement_contexts() -> ExtractResult<()> {
    let model = flat_model(DiagModel::None)?;
    let c1 = model.corner(1).unwrap();

    // Over, with a neighbor
    let ctx = MeasurementContext::new(2, 100, 1).under(1).separation(100);
    let rc = ctx.resolve(c1).unwrap();
    assert!(close(rc.coupling, 0.4));
    assert!(close(rc.resistance, 2.0));

    // Isolated Under: widest-separation sample
    let ctx = MeasurementContext::new(1, 100, 1).over(2);
    let rc = ctx.resolve(c1).unwrap();
    assert!(close(rc.fringe, 0.3));
    assert_eq!(rc.coupling, 0.0);

    // No OverUnder tables, nor diagonal tables, nor any relation at all
    assert!(MeasurementContext::new(2, 100, 1).under(1).over(3).resolve(c1).is_none());
    assert!(MeasurementContext::new(1, 100, 1).over(2).diag(100, 100).resolve(c1).is_none());
    assert!(MeasurementContext::new(1, 100, 1).resolve(c1).is_none());
    // Invalid layer pairs
    assert!(MeasurementContext::new(1, 100, 1).under(2).resolve(c1).is_none());

    // Accumulation
    let sample = DistanceSample::new(100, 0.5, 0.1, 2.0).with_diagonal(0.25);
    let mut ctx = MeasurementContext::new(1, 100, 2).under(0).separation(100);
    ctx.accumulate(&sample, 10, 0);
    ctx.accumulate(&sample, 10, 5);
    let t = ctx.totals()[0];
    assert!(close(t.coupling, 5.0));
    assert!(close(t.fringe, 1.0));
    assert!(close(t.diagonal, 2.5));
    assert!(close(t.resistance, 20.0));
    assert_eq!(ctx.totals()[1], RcTotals::default());

    // Isolated: no coupling
    let mut ctx = MeasurementContext::new(1, 100, 1).under(0);
    ctx.accumulate(&sample, 10, 0);
    assert_eq!(ctx.totals()[0].coupling, 0.0);
    assert!(close(ctx.totals()[0].fringe, 1.0));

    // Same net: half the fringe
    let mut ctx = MeasurementContext::new(1, 100, 1).under(0).separation(100).same_net(true);
    ctx.accumulate(&sample, 10, 0);
    assert_eq!(ctx.totals()[0].coupling, 0.0);
    assert!(close(ctx.totals()[0].fringe, 0.5));
    assert!(close(ctx.totals()[0].resistance, 20.0));
    Ok(())
}

#[test]
fn it_queries_bucket_planes() {
    let mut design = Design::new("planes", stack());
    let a = hwire(&mut design, 0, 0, 1, 0);
    hwire(&mut design, 1, 0, 1, 1000);
    design.add_wire(2, 0, 1, Dir::Horiz, Rect::from_coords(0, 2000, 1000, 4000));
    design.add_wire(3, 0, 3, Dir::Horiz, Rect::from_coords(0, 0, 1000, 100));

    let mut planes = BucketPlanes::new(vec![1, 2]);
    let keys: Vec<_> = design.shapes.iter().map(|s| planes.insert(*s)).collect();
    assert!(keys[0].is_some() && keys[1].is_some() && keys[2].is_some());
    // No plane for layer 3
    assert!(keys[3].is_none());
    // Idempotent by id
    assert!(planes.insert(design.shapes[0]).is_none());
    assert_eq!(planes.len(), 3);

    // The tall shape is found by its top edge
    assert_eq!(planes.query(1, 3500, 3600).len(), 1);
    assert_eq!(planes.query(1, 50, 1050).len(), 2);
    assert!(planes.query(2, 0, 5000).is_empty());
    assert!(planes.query(1, 10, 0).is_empty());

    let released = planes.release_before(1500);
    assert_eq!(released.len(), 2);
    assert!(!planes.contains(a));
    assert_eq!(planes.len(), 1);
    assert_eq!(planes.query(1, 0, 1500).len(), 0);

    let drained = planes.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].id, ShapeId(2));
    assert!(planes.is_empty());
    assert!(planes.query(1, 0, 5000).is_empty());
}

#[test]
fn it_measures_geometry() {
    let r = Rect::new(Point::new(10, 50), Point::new(0, 0));
    assert_eq!(r.p0, Point::new(0, 0));
    assert_eq!(r.size(Dir::Horiz), 10);
    assert_eq!(r.size(!Dir::Horiz), 50);
    assert_eq!(r.center(), Point::new(5, 25));
    assert_eq!(Point::offset(3, Dir::Vert).coord(Dir::Vert), 3);

    let a = Span::new(0, 100);
    assert_eq!(a.gap(&Span::new(150, 200)), 50);
    assert_eq!(a.gap(&Span::new(50, 200)), -50);
    assert_eq!(a.overlap(&Span::new(50, 200)), 50);
    assert_eq!(a.overlap(&Span::new(100, 200)), 0);

    let s = Shape {
        id: ShapeId(0),
        wire: WireId(0),
        net: NetId(0),
        layer: 1,
        dir: Dir::Vert,
        kind: ShapeKind::Wire,
        rect: Rect::from_coords(0, 0, 100, 2000),
    };
    assert_eq!(s.width(), 100);
    assert_eq!(s.length(), 2000);
    assert_eq!(s.sweep_span(), Span::new(0, 100));
    assert_eq!(format!("{}", s.wire), "0");
}

#[test]
fn it_snapshots_designs_and_results() -> ExtractResult<()> {
    let design = random_design(5, 20);
    let dir = tempfile::tempdir()?;
    for fname in ["design.json", "design.yaml"].iter() {
        let path = dir.path().join(fname);
        let fmt = SerializationFormat::from_path(&path).unwrap();
        design.save(fmt, &path)?;
        assert_eq!(Design::open_any(&path)?, design);
    }

    let extractor = Extractor::new(flat_model(DiagModel::Simple)?, ExtractOptions::default())?;
    let parasitics = extractor.extract(&design)?;
    let path = dir.path().join("parasitics.yaml");
    parasitics.save(SerializationFormat::Yaml, &path)?;
    let reopened = Parasitics::open(&path, SerializationFormat::Yaml)?;
    assert_eq!(reopened, parasitics);
    Ok(())
}
