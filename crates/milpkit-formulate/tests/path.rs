use std::io::Cursor;

use milpkit_formulate::{Coordinates, build_path};
use milpkit_solver::{MicroLp, SolutionStatus, SolveOptions};

const POINTS: &str = "node,x,y
1,20,6
2,22,1
3,9,2
4,3,25
5,21,10
6,29,2
7,14,12
";

#[test]
fn test_scenario_c() {
    let coordinates = Coordinates::from_csv(Cursor::new(POINTS)).unwrap();
    let arcs = coordinates.euclidean_arcs(20.0).unwrap();
    // 3 -> 6 is exactly 20 long and stays in
    assert!(arcs.contains(3, 6));
    assert!(!arcs.contains(4, 6));

    let mut formulation = build_path(&arcs, 4, 6).unwrap();
    let solution = formulation
        .solve(&MicroLp::new(), &SolveOptions::default())
        .unwrap();
    assert_eq!(solution.status, SolutionStatus::Optimal);

    let path = formulation.decode(&solution).unwrap();
    assert_eq!(path.nodes(), &[4, 7, 6]);
    assert_eq!(path.nodes().first(), Some(&4));
    assert_eq!(path.nodes().last(), Some(&6));

    let edge_sum: f64 = path.arcs().map(|(i, j)| arcs.cost(i, j).unwrap()).sum();
    assert!((path.cost() - edge_sum).abs() < 1e-9);
    assert!((path.cost() - 35.057142743246345).abs() < 1e-9);
    assert!((solution.objective_value.unwrap() - path.cost()).abs() < 1e-6);
}

#[test]
fn test_tighter_cutoff_changes_route() {
    let coordinates = Coordinates::from_csv(Cursor::new(POINTS)).unwrap();
    // Without 7 -> 6 (about 18.03) the path detours through node 1
    let arcs = coordinates.euclidean_arcs(18.0).unwrap();
    assert!(!arcs.contains(7, 6));

    let mut formulation = build_path(&arcs, 4, 6).unwrap();
    let solution = formulation
        .solve(&MicroLp::new(), &SolveOptions::default())
        .unwrap();
    let path = formulation.decode(&solution).unwrap();
    assert_eq!(path.nodes(), &[4, 7, 1, 6]);
}
