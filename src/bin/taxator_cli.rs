use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;

use taxator_rs::{run_pipeline, PlacementConfig};

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    bar.set_message(msg.to_string());
    bar
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 7 {
        eprintln!(
            "Usage: {} <nodes.dmp> <names.dmp> <seqid2taxid.map> <alignments.tsv> <queries.fasta> <references.fasta> [out_prefix]",
            args[0]
        );
        eprintln!(
            "Knobs via environment: TAXATOR_EXCLUDE_FACTOR (0,1], TAXATOR_REEVAL_BANDWIDTH [0,1)"
        );
        std::process::exit(2);
    }
    let out_prefix = args.get(7).cloned().unwrap_or_else(|| "taxator".to_string());

    let config = PlacementConfig {
        exclude_alignments_factor: env_f32("TAXATOR_EXCLUDE_FACTOR", 0.5),
        reeval_bandwidth: env_f32("TAXATOR_REEVAL_BANDWIDTH", 0.1),
        ..PlacementConfig::default()
    };

    let bar = spinner("green", "Placing queries...");
    let results = run_pipeline(
        &args[1],
        &args[2],
        &args[3],
        &args[4],
        vec![PathBuf::from(&args[5])],
        vec![PathBuf::from(&args[6])],
        &config,
    )
    .expect("Placement failed");
    bar.finish_with_message(format!(
        "Placed {}/{} queries.",
        results.queries_placed, results.queries_total
    ));

    let bar = spinner("yellow", "Writing output files...");
    fs::write(format!("{out_prefix}.gff3"), results.get_gff3_output())
        .expect("Could not write GFF3 output");
    fs::write(format!("{out_prefix}.log"), results.get_log_output())
        .expect("Could not write placement log");
    bar.finish_with_message("Output files created.");
}
