use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::rc::Rc;
use traffic_reroute::{
    Algorithm, JsonStore, MetricsStore, NetworkDescription, RerouteConfig, RerouteError,
    Rerouter, RoadNetworkIndex, Simulation, Table,
};

/// Fairness-aware rerouting of vehicles around congestion.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[command(subcommand)]
    op: Operation,
}

#[derive(Subcommand)]
enum Operation {
    /// Simulates a network, rerouting vehicles away from congestion.
    Run {
        /// JSON file describing the road network and its trips
        #[arg(short, long)]
        network: PathBuf,
        /// TOML file with the run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON file the metrics are written to
        #[arg(short, long, default_value = "metrics.json")]
        database: PathBuf,
        /// Rerouting algorithm, by name or index (0-4). Overrides the configuration.
        #[arg(short, long)]
        algorithm: Option<Algorithm>,
        /// Stop the run after this step
        #[arg(long)]
        stop_at: Option<usize>,
        /// Standard deviation of each vehicle's desired speed factor
        #[arg(long)]
        velocity_stddev: Option<f64>,
        /// Seed fairness records with the vehicle metrics already in the database
        #[arg(long)]
        resume: bool,
    },
    /// Deletes the rows of one or every table.
    Clear {
        #[arg(short, long)]
        database: PathBuf,
        /// Table to clear, `vehicle_output` or `simulation_output`. Clears both if omitted.
        #[arg(short, long)]
        table: Option<Table>,
    },
    /// Prints every row of a table as JSON.
    Dump {
        #[arg(short, long)]
        database: PathBuf,
        #[arg(short, long)]
        table: Table,
    },
}

impl Operation {
    fn run(&self) -> Result<(), RerouteError> {
        match self {
            Operation::Run {
                network,
                config,
                database,
                algorithm,
                stop_at,
                velocity_stddev,
                resume,
            } => {
                let mut config = match config {
                    Some(path) => RerouteConfig::load(path)?,
                    None => RerouteConfig::default(),
                };
                if let Some(algorithm) = algorithm {
                    config.algorithm = *algorithm;
                }
                config.validate()?;

                let desc = NetworkDescription::load(network)?;
                let index = Rc::new(RoadNetworkIndex::with_params(
                    &desc,
                    config.max_edge_recursions_range,
                    config.min_edge_length,
                )?);
                let mut sim = Simulation::with_trips(index.clone(), &desc.trips)?;
                if let Some(stddev) = velocity_stddev {
                    let mut rng = StdRng::seed_from_u64(config.seed);
                    sim.randomise_velocity_adjusts(*stddev, &mut rng)?;
                }

                log::info!(
                    "Running {} on {} edges with {} trips",
                    config.algorithm,
                    index.edge_count(),
                    desc.trips.len()
                );
                let store = JsonStore::open(database)?;
                let mut rerouter = Rerouter::new(sim, index, store, config)?;
                if *resume {
                    rerouter.load_previous_records()?;
                }
                rerouter.set_stop_at(*stop_at);
                let reason = rerouter.run()?;
                println!("{}", reason);
                Ok(())
            }
            Operation::Clear { database, table } => {
                let mut store = JsonStore::open(database)?;
                match table {
                    Some(table) => store.clear_table(*table)?,
                    None => store.clear_all()?,
                }
                store.commit()
            }
            Operation::Dump { database, table } => {
                let store = JsonStore::open(database)?;
                let rows = store.read_all_rows(*table)?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
                Ok(())
            }
        }
    }
}

fn main() -> Result<(), RerouteError> {
    env_logger::init();
    let args = App::parse();
    args.op.run()
}
