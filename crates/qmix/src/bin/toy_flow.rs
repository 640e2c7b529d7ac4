use std::error::Error;

use clap::Parser;
use qmix::{
    MixedHarmonics, MixedHarmonicsConfig, MultiplicityBinning, PairVariable, ParticleWeights,
    ToyEventGenerator,
};

#[derive(Parser, Debug)]
#[command(
    name = "toy_flow",
    about = "Measure cos[n(phi1+phi2-2phi3)] in toy events with anisotropic flow"
)]
struct Cli {
    /// Number of events to generate.
    #[arg(long, default_value_t = 1000)]
    events: usize,
    /// Number of tracks per event.
    #[arg(long, default_value_t = 100)]
    multiplicity: usize,
    /// The harmonic n.
    #[arg(long, default_value_t = 1)]
    harmonic: u32,
    /// Flow coefficient in harmonic n.
    #[arg(long, default_value_t = 0.05)]
    vn: f64,
    /// Flow coefficient in harmonic 2n.
    #[arg(long, default_value_t = 0.1)]
    v2n: f64,
    /// Fraction of tracks which are particles of interest.
    #[arg(long, default_value_t = 0.5)]
    poi_fraction: f64,
    /// Seed of the event generator.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Lower edge of the first multiplicity bin.
    #[arg(long, default_value_t = 1.0)]
    mult_min: f64,
    /// Width of the multiplicity bins.
    #[arg(long, default_value_t = 2.0)]
    mult_width: f64,
    /// Number of multiplicity bins.
    #[arg(long, default_value_t = 10)]
    mult_bins: usize,
    /// Also evaluate the differential correlator.
    #[arg(long)]
    differential: bool,
    /// Only pair particles of interest with opposite charges.
    #[arg(long)]
    opposite_charges: bool,
    /// Skip the correction for detector effects.
    #[arg(long)]
    no_correction: bool,
    /// Save the analysis to this file.
    #[arg(long)]
    save: Option<String>,
    /// Merge a previously saved analysis of other events into the results.
    #[arg(long)]
    merge: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = MixedHarmonicsConfig::new()
        .harmonic(cli.harmonic)
        .multiplicity(MultiplicityBinning::new(
            cli.mult_min,
            cli.mult_width,
            cli.mult_bins,
        ))
        .evaluate_differential(cli.differential)
        .opposite_charges_poi(cli.opposite_charges)
        .correct_for_detector_effects(!cli.no_correction)
        .print_results(false);
    let mut analysis = MixedHarmonics::new(config, ParticleWeights::none())?;
    let events = ToyEventGenerator::new(cli.seed)
        .multiplicity(cli.multiplicity)
        .flow(cli.harmonic, cli.vn)
        .flow(2 * cli.harmonic, cli.v2n)
        .poi_fraction(cli.poi_fraction)
        .generate_many(cli.events);
    analysis.process_events(&events)?;
    if let Some(path) = &cli.save {
        analysis.save_as(path)?;
    }
    if let Some(path) = &cli.merge {
        analysis.merge(&MixedHarmonics::load_from(path)?)?;
    }
    let results = analysis.finish()?;
    println!("{}", results);
    // for flow relative to a common plane the correlator approaches vn^2 * v2n
    println!(
        "  expected (vn^2 v2n) = {}",
        cli.vn * cli.vn * cli.v2n
    );
    if let Some(differential) = &results.differential {
        println!();
        println!("  differential correlator vs (pT1+pT2)/2:");
        for (i, estimate) in differential
            .get(PairVariable::PtSum)
            .iter()
            .enumerate()
            .filter(|(_, e)| e.value != 0.0)
        {
            println!(
                "    [{:.2}, {:.2}): {}",
                differential.binning.low_edge(i),
                differential.binning.low_edge(i + 1),
                estimate
            );
        }
    }
    Ok(())
}
