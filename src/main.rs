use clap::Parser;
use dslab_core::Simulation;
use widget_load_simulator::layout_reader::WidgetLayout;
use widget_load_simulator::simulation::DashboardSimulation;
use widget_load_simulator::simulation_config::SimulationConfig;
use widget_load_simulator::simulation_metrics::{CsvMetricsLogger, FileMetricsLogger, MetricsLogger};

/// Simulates dashboard widgets loading their metrics through the request aggregator.
#[derive(Parser, Debug)]
#[command(name = "widget-load-simulator", version)]
struct Args {
    /// Simulation config (YAML)
    #[arg(long, default_value = "test-configs/config.yaml")]
    config: String,

    /// Widget layout (JSON) added on top of the config widgets
    #[arg(long)]
    layout: Option<String>,

    /// Simulation duration in seconds
    #[arg(long, default_value_t = 600.0)]
    duration: f64,

    /// Where to save the metrics log
    #[arg(long, default_value = "./results.json")]
    output: String,

    /// Save the metrics log as CSV instead of JSON
    #[arg(long)]
    csv: bool,

    /// Metrics snapshot period in seconds
    #[arg(long, default_value_t = 60.0)]
    snapshot_period: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let sim = Simulation::new(42);
    let sim_config = SimulationConfig::from_file(&args.config)?;
    let metrics_logger: Box<dyn MetricsLogger> = if args.csv {
        Box::new(CsvMetricsLogger::new(args.snapshot_period))
    } else {
        Box::new(FileMetricsLogger::new(args.snapshot_period))
    };

    let mut dashboard_sim = DashboardSimulation::new(sim, sim_config, metrics_logger);
    if let Some(layout) = &args.layout {
        let layout = WidgetLayout::from_file(layout)?;
        log::info!("Rendering layout {} with {} widgets", layout.layout_name, layout.widgets.len());
        dashboard_sim.add_layout(&layout);
    }

    dashboard_sim.step_for_duration(args.duration);
    dashboard_sim.finish_simulation(&args.output)?;
    Ok(())
}
