use std::path::Path;
use std::time::Instant;

use certiq_core::{Pipeline, Result};
use certiq_tests::TestResult;

use super::PipelineArgs;

pub fn run(
    config_path: Option<&Path>,
    args: &PipelineArgs,
    num_bits: usize,
    include_raw: bool,
    output: Option<&Path>,
) -> Result<()> {
    let config = super::load_config(config_path, args)?;
    let pipeline = Pipeline::from_config(&config)?;

    println!(
        "Running test battery on {num_bits} extracted bits from {}...\n",
        pipeline.backend_name()
    );
    let t0 = Instant::now();
    let bits = pipeline.random_bits(num_bits)?;
    let mut sections = vec![("extracted", certiq_tests::run_all_tests(&bits))];

    if include_raw {
        let result = pipeline.sample(config.generator.num_raw_bits)?;
        sections.push(("raw", certiq_tests::run_all_tests(&result.extractor_bits())));
    }

    for (label, results) in &sections {
        print_section(label, results);
    }
    println!("Elapsed: {:.1}s", t0.elapsed().as_secs_f64());

    if let Some(path) = output {
        let json = serde_json::json!({
            "backend": pipeline.backend_name(),
            "num_bits": num_bits,
            "sections": sections.iter().map(|(label, results)| serde_json::json!({
                "input": label,
                "score": certiq_tests::calculate_quality_score(results),
                "tests": results.iter().map(|r| serde_json::json!({
                    "name": r.name,
                    "passed": r.passed,
                    "p_value": r.p_value,
                    "statistic": r.statistic,
                    "details": r.details,
                    "grade": r.grade.to_string(),
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        });
        super::emit(Some(path), &serde_json::to_string_pretty(&json)?)?;
    }
    Ok(())
}

fn print_section(label: &str, results: &[TestResult]) {
    let score = certiq_tests::calculate_quality_score(results);
    let passed = results.iter().filter(|r| r.passed).count();
    println!("== {label}: {score:.0}/100 ({passed}/{} passed)", results.len());
    println!("  {:<22} {:>5} {:>10}  Details", "Test", "Grade", "p-value");
    for r in results {
        let p = r.p_value.map_or_else(|| "-".to_string(), |p| format!("{p:.4}"));
        let mark = if r.passed { "✓" } else { "✗" };
        println!("{mark} {:<22} {:>5} {:>10}  {}", r.name, r.grade, p, r.details);
    }
    println!();
}
