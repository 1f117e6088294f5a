use milpkit_formulate::{AllocationPlan, AllocationProblem, Carrier, Resource, build_allocation};
use milpkit_solver::{MicroLp, SolutionStatus, SolveOptions};

const TOL: f64 = 1e-6;

fn resource(id: usize, value: f64, weight: f64, volume: f64, available: f64) -> Resource {
    Resource {
        id,
        value,
        weight,
        volume,
        available,
        indivisible: false,
    }
}

fn carrier(id: usize) -> Carrier {
    Carrier {
        id,
        weight_capacity: 10.0,
        volume_capacity: 10.0,
    }
}

fn solve(problem: &AllocationProblem) -> AllocationPlan {
    let mut formulation = build_allocation(problem).unwrap();
    let solution = formulation
        .solve(&MicroLp::new(), &SolveOptions::default())
        .unwrap();
    assert_eq!(solution.status, SolutionStatus::Optimal);
    let plan = formulation.decode(&solution).unwrap();
    assert!((solution.objective_value.unwrap() - plan.value).abs() < TOL);
    plan
}

fn assert_within_capacity(problem: &AllocationProblem, plan: &AllocationPlan) {
    for c in &problem.carriers {
        let (mut weight, mut volume) = (0.0, 0.0);
        for r in &problem.resources {
            let q = plan.quantities.get(r.id, c.id).unwrap();
            weight += q * r.weight;
            volume += q * r.volume;
        }
        assert!(weight <= c.weight_capacity + TOL, "carrier {} weight {}", c.id, weight);
        assert!(volume <= c.volume_capacity + TOL, "carrier {} volume {}", c.id, volume);
    }
    for r in &problem.resources {
        assert!(plan.quantities.row_total(r.id).unwrap() <= r.available + TOL);
    }
}

#[test]
fn test_two_carriers_share_the_load() {
    let problem = AllocationProblem {
        resources: vec![resource(1, 10.0, 2.0, 1.0, 10.0), resource(2, 6.0, 1.0, 2.0, 10.0)],
        carriers: vec![carrier(1), carrier(2)],
        ..Default::default()
    };
    let plan = solve(&problem);
    assert_within_capacity(&problem, &plan);
    assert!((plan.value - 2.0 * 160.0 / 3.0).abs() < TOL);
}

#[test]
fn test_incompatible_resources_never_share() {
    let problem = AllocationProblem {
        resources: vec![resource(1, 10.0, 2.0, 1.0, 4.0), resource(2, 6.0, 1.0, 2.0, 4.0)],
        carriers: vec![carrier(1), carrier(2)],
        incompatible: vec![(1, 2)],
        ..Default::default()
    };
    let plan = solve(&problem);
    assert_within_capacity(&problem, &plan);
    assert!((plan.value - 64.0).abs() < TOL);

    for c in [1, 2] {
        let both = plan.quantities.get(1, c).unwrap() > 0.0 && plan.quantities.get(2, c).unwrap() > 0.0;
        assert!(!both, "carrier {} holds both incompatible resources", c);
    }
}

#[test]
fn test_indivisible_with_forbidden_pair() {
    let mut heavy = resource(1, 10.0, 2.0, 1.0, 10.0);
    heavy.indivisible = true;
    let problem = AllocationProblem {
        resources: vec![heavy, resource(2, 6.0, 1.0, 2.0, 10.0)],
        carriers: vec![carrier(1), carrier(2)],
        forbidden: vec![(2, 2)],
        ..Default::default()
    };
    let plan = solve(&problem);
    assert_within_capacity(&problem, &plan);
    assert_eq!(plan.quantities.get(2, 2), Some(0.0));

    // Carrier 2 takes five whole units of resource 1, carrier 1 repeats the
    // single-carrier integer optimum
    assert!((plan.value - 102.0).abs() < TOL);
    for c in [1, 2] {
        let q = plan.quantities.get(1, c).unwrap();
        assert!((q - q.round()).abs() < TOL);
    }
}

#[test]
fn test_availability_binds() {
    let problem = AllocationProblem {
        resources: vec![resource(1, 10.0, 1.0, 1.0, 3.0)],
        carriers: vec![carrier(1), carrier(2)],
        ..Default::default()
    };
    let plan = solve(&problem);
    assert!((plan.quantities.row_total(1).unwrap() - 3.0).abs() < TOL);
    assert!((plan.value - 30.0).abs() < TOL);
}
