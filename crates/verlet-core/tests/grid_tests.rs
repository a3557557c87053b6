use glam::Vec3;
use verlet_core::grid::SpatialHashGrid;

fn grid(cell_size: f32, table_size: usize, capacity: usize) -> SpatialHashGrid {
    SpatialHashGrid::new(cell_size, table_size, capacity).expect("grid allocation")
}

fn members(grid: &SpatialHashGrid, pos: Vec3) -> Vec<u32> {
    let mut found = Vec::new();
    grid.query_cell(grid.cell_at(pos), |idx| found.push(idx));
    found
}

#[test]
fn test_grid_build_and_query() {
    let mut grid = grid(1.0, 1024, 100);

    // Two particles share a cell, one is far away
    let positions = vec![
        Vec3::new(0.1, 0.1, 0.1),
        Vec3::new(0.2, 0.2, 0.2),
        Vec3::new(10.0, 10.0, 10.0),
    ];
    grid.build(&positions, 3);

    let neighbors = members(&grid, positions[0]);
    assert!(neighbors.contains(&0), "should find self");
    assert!(neighbors.contains(&1), "should find particle in the same cell");
    assert!(!neighbors.contains(&2), "should NOT find far particle");
}

#[test]
fn test_grid_all_particles_found() {
    let mut grid = grid(0.2, 131_072, 1000);

    let positions: Vec<Vec3> = (0..1000)
        .map(|i| {
            let t = i as f32 / 1000.0;
            let angle = t * std::f32::consts::TAU * 20.0;
            let r = 0.5 + t * 2.0;
            Vec3::new(angle.cos() * r, (t - 0.5) * 3.0, angle.sin() * r)
        })
        .collect();
    grid.build(&positions, 1000);

    for (i, p) in positions.iter().enumerate() {
        assert!(
            members(&grid, *p).contains(&(i as u32)),
            "particle {} not found in its own cell query",
            i
        );
    }
}

#[test]
fn test_grid_empty() {
    let mut grid = grid(1.0, 1024, 100);
    grid.build(&[], 0);
    assert!(grid.is_empty());
    assert!(members(&grid, Vec3::ZERO).is_empty());
}

#[test]
fn test_grid_rebuild() {
    let mut grid = grid(1.0, 1024, 100);
    grid.build(&[Vec3::ZERO, Vec3::splat(5.0)], 2);
    grid.build(&[Vec3::splat(5.0), Vec3::ZERO], 2);

    assert_eq!(members(&grid, Vec3::ZERO), vec![1]);
    assert_eq!(members(&grid, Vec3::splat(5.0)), vec![0]);
}

#[test]
fn test_grid_negative_positions() {
    let mut grid = grid(1.0, 1024, 100);
    let positions = vec![
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(-0.9, -1.0, -1.0),
        Vec3::new(-0.1, -0.1, -0.1),
        Vec3::new(0.1, 0.1, 0.1),
    ];
    grid.build(&positions, 4);

    assert_eq!(grid.cell_of(0), glam::IVec3::splat(-1));
    let neighbors = members(&grid, positions[0]);
    assert!(neighbors.contains(&0) && neighbors.contains(&1) && neighbors.contains(&2));
    // floor() puts -0.1 and 0.1 in different cells
    assert!(!neighbors.contains(&3));
}

#[test]
fn test_colliding_buckets_filtered_by_cell() {
    // A single bucket forces every cell into the same hash slot.
    let mut grid = grid(1.0, 1, 16);
    let positions = vec![Vec3::ZERO, Vec3::new(3.5, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5)];
    grid.build(&positions, 3);

    assert_eq!(grid.bucket(grid.cell_at(Vec3::ZERO)).len(), 3);
    let mut found = members(&grid, Vec3::ZERO);
    found.sort_unstable();
    assert_eq!(found, vec![0, 2]);
}

#[test]
fn test_grid_large_positions() {
    let mut grid = grid(1.0, 1024, 100);
    let far = Vec3::splat(1000.0);
    grid.build(&[far], 1);
    assert_eq!(members(&grid, far), vec![0]);
}
