use clap::{Args, Parser, Subcommand};
use milpkit_formulate::{
    AllocationProblem, CostMatrix, Coordinates, QuantityMatrix, TeamOptions, Tour, TourOptions, TransportProblem,
};
use milpkit_solver::{Domain, MicroLp, Solution, SolutionStatus, SolveOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "milpkit")]
#[command(about = "Build, solve and decode routing, flow and allocation models", long_about = None)]
struct Cli {
    /// Log model sizes and solver progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SolveArgs {
    /// Stop waiting for the solver after this many seconds
    #[arg(long, value_name = "SECS")]
    time_limit: Option<f64>,
    /// JSON file with solver options
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cheapest closed tour through every node of a cost matrix
    Tour {
        /// CSV cost matrix with a header row of node ids
        matrix: PathBuf,
        /// The matrix has a leading index column
        #[arg(long)]
        index_column: bool,
        /// Node the tour starts from (defaults to the first)
        #[arg(long)]
        depot: Option<usize>,
        /// Use integer order variables
        #[arg(long)]
        integer_order: bool,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Split the nodes among several teams sharing a depot
    Teams {
        matrix: PathBuf,
        /// Number of teams
        #[arg(short, long)]
        teams: usize,
        #[arg(long)]
        index_column: bool,
        #[arg(long)]
        depot: Option<usize>,
        /// Fewest arcs a team may travel
        #[arg(long, requires = "max_arcs")]
        min_arcs: Option<usize>,
        /// Most arcs a team may travel
        #[arg(long, requires = "min_arcs")]
        max_arcs: Option<usize>,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Minimum-cost transportation plan from a JSON instance
    Transport {
        problem: PathBuf,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Shortest path over Euclidean arcs no longer than a cutoff
    Path {
        /// CSV with node,x,y columns
        coordinates: PathBuf,
        #[arg(long)]
        source: usize,
        #[arg(long)]
        sink: usize,
        /// Longest usable arc
        #[arg(long, default_value_t = f64::INFINITY)]
        max_edge: f64,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Value-maximizing allocation of resources to carriers from a JSON instance
    Allocate {
        problem: PathBuf,
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Check a cost matrix for errors
    Check {
        matrix: PathBuf,
        #[arg(long)]
        index_column: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Tour {
            matrix,
            index_column,
            depot,
            integer_order,
            solve,
        } => {
            let costs = exit_on_err(CostMatrix::from_csv_path(&matrix, index_column), "Input error");
            let options = TourOptions {
                depot,
                order_domain: if integer_order { Domain::Integer } else { Domain::Continuous },
            };
            let mut formulation = exit_on_err(milpkit_formulate::build_tour(&costs, &options), "Model error");
            let solution = exit_on_err(
                formulation.solve(&MicroLp::new(), &solve_options(&solve)),
                "Model error",
            );
            print_status(&solution);

            let tour = exit_on_err(formulation.decode(&solution), "Decode error");
            println!();
            print_tour("Tour", &tour);
        }
        Commands::Teams {
            matrix,
            teams,
            index_column,
            depot,
            min_arcs,
            max_arcs,
            solve,
        } => {
            let costs = exit_on_err(CostMatrix::from_csv_path(&matrix, index_column), "Input error");
            let mut options = TeamOptions::new(teams);
            options.depot = depot;
            if let (Some(lo), Some(hi)) = (min_arcs, max_arcs) {
                options = options.with_balance(milpkit_formulate::Bound::Between(lo as f64, hi as f64));
            }
            let mut formulation = exit_on_err(milpkit_formulate::build_teams(&costs, &options), "Model error");
            println!("Arcs per team: {:?}", formulation.balance());
            let solution = exit_on_err(
                formulation.solve(&MicroLp::new(), &solve_options(&solve)),
                "Model error",
            );
            print_status(&solution);

            let partition = exit_on_err(formulation.decode(&solution), "Decode error");
            println!();
            for route in partition.routes() {
                print_tour(&format!("Team {}", route.agent), &route.tour);
            }
            println!("Total cost: {:.2}", partition.total_cost());
        }
        Commands::Transport { problem, solve } => {
            let problem: TransportProblem = read_json(&problem);
            println!(
                "Supply {:.2}, demand {:.2}",
                problem.total_supply(),
                problem.total_demand()
            );
            let mut formulation = exit_on_err(milpkit_formulate::build_transport(&problem), "Model error");
            let solution = exit_on_err(
                formulation.solve(&MicroLp::new(), &solve_options(&solve)),
                "Model error",
            );
            print_status(&solution);

            let plan = exit_on_err(formulation.decode(&solution), "Decode error");
            println!();
            println!("Flows (origin -> destination):");
            print_quantities(&plan.flows);
            println!("Total cost: {:.2}", plan.cost);
        }
        Commands::Path {
            coordinates,
            source,
            sink,
            max_edge,
            solve,
        } => {
            let points = exit_on_err(Coordinates::from_csv_path(&coordinates), "Input error");
            let arcs = exit_on_err(points.euclidean_arcs(max_edge), "Input error");
            println!("{} usable arcs", arcs.len());
            let mut formulation = exit_on_err(milpkit_formulate::build_path(&arcs, source, sink), "Model error");
            let solution = exit_on_err(
                formulation.solve(&MicroLp::new(), &solve_options(&solve)),
                "Model error",
            );
            print_status(&solution);

            let path = exit_on_err(formulation.decode(&solution), "Decode error");
            println!();
            println!("Path:");
            for (i, j) in path.arcs() {
                println!("  {:>4} -> {:<4} {:10.4}", i, j, arcs.cost(i, j).unwrap_or(0.0));
            }
            println!("Total cost: {:.4}", path.cost());
        }
        Commands::Allocate { problem, solve } => {
            let problem: AllocationProblem = read_json(&problem);
            let mut formulation = exit_on_err(milpkit_formulate::build_allocation(&problem), "Model error");
            let solution = exit_on_err(
                formulation.solve(&MicroLp::new(), &solve_options(&solve)),
                "Model error",
            );
            print_status(&solution);

            let plan = exit_on_err(formulation.decode(&solution), "Decode error");
            println!();
            println!("Allocation (resource -> carrier):");
            print_quantities(&plan.quantities);
            println!("Total value: {:.2}", plan.value);
        }
        Commands::Check { matrix, index_column } => match CostMatrix::from_csv_path(&matrix, index_column) {
            Ok(costs) => {
                let forbidden = (0..costs.size())
                    .flat_map(|i| (0..costs.size()).map(move |j| (i, j)))
                    .filter(|&(i, j)| i != j && costs.cost(i, j).is_none())
                    .count();
                println!("✓ {} is valid", matrix.display());
                println!("  {} nodes", costs.size());
                println!("  {} forbidden arcs", forbidden);
                println!("  {}", if costs.is_symmetric() { "symmetric" } else { "asymmetric" });
            }
            Err(e) => {
                eprintln!("✗ {} has errors:", matrix.display());
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn exit_on_err<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}: {}", context, e);
            std::process::exit(1);
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let source = exit_on_err(std::fs::read_to_string(path), "Error reading file");
    exit_on_err(serde_json::from_str(&source), "Invalid JSON")
}

fn solve_options(args: &SolveArgs) -> SolveOptions {
    let mut options = match &args.options {
        Some(path) => read_json(path),
        None => SolveOptions::default(),
    };
    if let Some(secs) = args.time_limit {
        let limit = exit_on_err(Duration::try_from_secs_f64(secs), "Invalid time limit");
        options = options.with_time_limit(limit);
    }
    log::debug!("solve options: {:?}", options);
    options
}

fn print_status(solution: &Solution) {
    let label = match solution.status {
        SolutionStatus::Optimal => "OPTIMAL",
        SolutionStatus::Infeasible => "INFEASIBLE",
        SolutionStatus::Unbounded => "UNBOUNDED",
        SolutionStatus::TimeLimitReached => "TIME LIMIT",
        SolutionStatus::Error => "ERROR",
    };
    println!("Status: {}", label);
    if let Some(objective) = solution.objective_value {
        println!("Objective: {:.4}", objective);
    }
    if let Some(message) = &solution.message {
        println!("{}", message);
    }
}

fn print_tour(title: &str, tour: &Tour) {
    let stops: Vec<String> = tour
        .stops()
        .iter()
        .chain(std::iter::once(&tour.depot()))
        .map(|s| s.to_string())
        .collect();
    println!("{}: {}  (cost {:.2})", title, stops.join(" -> "), tour.cost());
}

fn print_quantities(matrix: &QuantityMatrix) {
    for (row, column, value) in matrix.nonzero() {
        println!("  {:>4} -> {:<4} {:12.2}", row, column, value);
    }
    for &row in matrix.rows() {
        println!("  row {:>4} total {:12.2}", row, matrix.row_total(row).unwrap_or(0.0));
    }
}
