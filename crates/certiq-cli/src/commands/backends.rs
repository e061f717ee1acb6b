use certiq_core::backend::simulator::profile_names;
use certiq_core::constants::expected_correlator;
use certiq_core::{Backend, BackendSelection, Result};

pub fn run() -> Result<()> {
    let mut names = vec!["statevector_simulator"];
    names.extend(profile_names());

    println!(
        "{:<24} {:>6} {:>9} {:>8} {:>8} {:>10} {:>9}",
        "Backend", "Qubits", "MaxShots", "MaxExp", "Readout", "Simulated", "Profiled"
    );
    println!("{}", "-".repeat(80));
    for name in names {
        let backend = BackendSelection {
            name: name.to_string(),
            ..Default::default()
        }
        .build()?;
        let cfg = backend.configuration();
        let noise = backend.noise();
        let profiled = expected_correlator(name).map_or_else(|| "-".to_string(), |c| format!("{c:.2}"));
        println!(
            "{:<24} {:>6} {:>9} {:>8} {:>8.4} {:>10.3} {:>9}",
            cfg.name,
            cfg.num_qubits,
            cfg.max_shots,
            cfg.max_experiments,
            noise.readout_error,
            noise.expected_correlator(),
            profiled
        );
    }
    println!();
    println!("Simulated: correlator the readout noise model produces. Profiled: value certified");
    println!("when the backend is trusted (override with --expected-correlator).");
    Ok(())
}
