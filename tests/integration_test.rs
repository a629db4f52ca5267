use cloth_sim::cloth::*;
use cloth_sim::config::{ClothConfig, SimConfig, SolverConfig};
use glam::Vec3;

fn max_displacement(a: &[Particle], b: &[Particle]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(p, q)| p.position().distance(q.position()))
        .fold(0.0, f32::max)
}

#[test]
fn test_rest_pose_idempotent() -> anyhow::Result<()> {
    for (w, h) in [(2, 2), (5, 3), (8, 8), (3, 11)] {
        let mut sim = StageEmulator::new(&ClothConfig::with_grid(w, h), &SolverConfig::without_forces())?;
        let before = sim.particles().to_vec();
        sim.step()?;
        assert!(max_displacement(&before, sim.particles()) < 1e-6, "{}x{} moved", w, h);
    }
    Ok(())
}

#[test]
fn test_anchors_hold_exact_targets() -> anyhow::Result<()> {
    let mut sim = StageEmulator::new(&ClothConfig::with_grid(10, 10), &SolverConfig::default())?;
    for _ in 0..120 {
        sim.step()?;
    }

    assert_eq!(sim.anchors().len(), 3);
    let initial = sim.model().initial_particles();
    for anchor in sim.anchors().anchors() {
        let index = anchor.index as usize;
        assert_eq!(sim.particles()[index].position, initial[index].position);
    }
    Ok(())
}

#[test]
fn test_anchor_toggle() -> anyhow::Result<()> {
    let config = ClothConfig::with_grid(4, 4).with_pin_columns(vec![0, 1, 3]);
    let mut sim = StageEmulator::new(&config, &SolverConfig::default())?;
    for _ in 0..10 {
        sim.step()?;
    }
    let target = sim.model().initial_particles()[0].position;
    assert_eq!(sim.particles()[0].position, target);

    // 禁用后，原来的固定点参与积分和松弛
    assert!(!sim.toggle_anchors());
    assert!(!sim.plan().has_anchor_stage());
    sim.step()?;
    assert_ne!(sim.particles()[0].position, target);

    // 重新启用后，下一次锚点阶段把它拉回目标
    assert!(sim.toggle_anchors());
    sim.step()?;
    assert_eq!(sim.particles()[0].position, target);
    Ok(())
}

#[test]
fn test_four_by_four_sags_under_gravity() -> anyhow::Result<()> {
    let config = ClothConfig::with_grid(4, 4).with_pin_columns(vec![0, 1, 3]);
    let mut sim = StageEmulator::new(&config, &SolverConfig::default())?;
    let dims = sim.model().dims();
    let last_row: Vec<usize> = (0..4).map(|i| dims.index(i, 3) as usize).collect();

    let mut lowest_last_row = 0.0f32;
    for _ in 0..100 {
        sim.step()?;
        let mean = last_row.iter().map(|&i| sim.particles()[i].position[1]).sum::<f32>() / 4.0;
        lowest_last_row = lowest_last_row.min(mean);
    }
    assert!(lowest_last_row < -0.3);

    let anchored = [0usize, 1, 3];
    for index in anchored {
        assert!(sim.particles()[index].position[1].abs() < 1e-6);
    }

    let free: Vec<f32> = (0..16)
        .filter(|i| !anchored.contains(i))
        .map(|i| sim.particles()[i].position[1])
        .collect();
    let mean_free = free.iter().sum::<f32>() / free.len() as f32;
    assert!(mean_free < 0.0);
    assert!(sim.particles().iter().all(|p| p.position().is_finite()));
    Ok(())
}

#[test]
fn test_minimal_grid() -> anyhow::Result<()> {
    let dims = GridDims::new(2, 2)?;
    let particles = initial_particles(dims)?;
    let graph = build_constraint_graph(dims, &particles)?;

    assert_eq!(graph.len(), 6);
    assert_eq!(expected_constraint_count(dims), 6);
    assert_eq!(graph.layout().sizes(), &[2, 0, 2, 0, 1, 0, 1, 0]);
    graph.validate()?;

    assert_eq!(graph.batch(4)[0].start, 0);
    assert_eq!(graph.batch(4)[0].end, 3);
    assert_eq!(graph.batch(6)[0].start, 1);
    assert_eq!(graph.batch(6)[0].end, 2);

    let mut sim = StageEmulator::new(&ClothConfig::with_grid(2, 2), &SolverConfig::default())?;
    assert_eq!(sim.anchors().len(), 2);
    for _ in 0..30 {
        sim.step()?;
    }
    Ok(())
}

#[test]
fn test_non_square_partition() -> anyhow::Result<()> {
    for (w, h) in [(2, 17), (17, 2), (7, 4), (64, 3)] {
        let dims = GridDims::new(w, h)?;
        let graph = build_constraint_graph(dims, &initial_particles(dims)?)?;
        graph.validate()?;
        assert_eq!(graph.len() as u64, expected_constraint_count(dims));
    }
    Ok(())
}

#[test]
fn test_config_file_drives_cloth() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cloth.toml");
    std::fs::write(
        &path,
        r#"
        [cloth]
        width = 6
        height = 4
        pin_columns = [0, 5]
        anchors_enabled = true

        [solver]
        gravity = [0.0, -1.0, 0.0]
        damping = 0.98
        time_step = 0.01
        max_substeps = 2
        "#,
    )?;

    let config = SimConfig::from_toml_file(&path)?;
    config.validate()?;
    assert_eq!(config.solver.gravity, Vec3::new(0.0, -1.0, 0.0));

    let mut sim = StageEmulator::new(&config.cloth, &config.solver)?;
    sim.step()?;
    let stats = sim.stats();
    assert_eq!(stats.particle_count, 24);
    assert_eq!(stats.anchor_count, 2);
    assert_eq!(stats.frames, 1);

    let saved = dir.path().join("saved.json");
    config.save_json(&saved)?;
    assert_eq!(SimConfig::from_json_file(&saved)?, config);
    Ok(())
}

#[test]
fn test_reset_after_simulation() -> anyhow::Result<()> {
    let mut sim = StageEmulator::new(&ClothConfig::with_grid(5, 5), &SolverConfig::default())?;
    for _ in 0..15 {
        sim.step()?;
    }
    sim.reset();
    assert_eq!(sim.particles(), sim.model().initial_particles());
    Ok(())
}
