//! Mermin-game circuit construction.
//!
//! Each round of the Mermin game prepares a GHZ-like state and measures every
//! qubit in either the X or the Y basis. The 3-bit WSR triple chooses the
//! bases: a `1` in position `i` adds an `sdg` before the final Hadamard on
//! qubit `i`, turning an X measurement into a Y measurement.

use std::fmt;

/// Number of qubits in a Mermin round.
pub const MERMIN_QUBITS: usize = 3;

/// Measurement-basis label for one round. One entry per qubit, each 0 or 1.
pub type Label = [u8; MERMIN_QUBITS];

/// Gates understood by the bundled backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// Hadamard.
    H(usize),
    /// Controlled-X (control, target).
    Cx(usize, usize),
    /// Phase gate, `diag(1, i)`.
    S(usize),
    /// Inverse phase gate, `diag(1, -i)`.
    Sdg(usize),
    /// Scheduling barrier, no effect on the state.
    Barrier,
    /// Measure every qubit into the classical register of the same index.
    MeasureAll,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H(q) => write!(f, "h q[{q}]"),
            Self::Cx(c, t) => write!(f, "cx q[{c}],q[{t}]"),
            Self::S(q) => write!(f, "s q[{q}]"),
            Self::Sdg(q) => write!(f, "sdg q[{q}]"),
            Self::Barrier => write!(f, "barrier"),
            Self::MeasureAll => write!(f, "measure q -> c"),
        }
    }
}

/// A gate list over a fixed number of qubits and classical bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantumCircuit {
    name: String,
    num_qubits: usize,
    gates: Vec<Gate>,
}

impl QuantumCircuit {
    pub fn new(name: impl Into<String>, num_qubits: usize) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            gates: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn h(&mut self, q: usize) -> &mut Self {
        self.gates.push(Gate::H(q));
        self
    }

    pub fn cx(&mut self, control: usize, target: usize) -> &mut Self {
        self.gates.push(Gate::Cx(control, target));
        self
    }

    pub fn s(&mut self, q: usize) -> &mut Self {
        self.gates.push(Gate::S(q));
        self
    }

    pub fn sdg(&mut self, q: usize) -> &mut Self {
        self.gates.push(Gate::Sdg(q));
        self
    }

    pub fn barrier(&mut self) -> &mut Self {
        self.gates.push(Gate::Barrier);
        self
    }

    pub fn measure_all(&mut self) -> &mut Self {
        self.gates.push(Gate::MeasureAll);
        self
    }

    /// True if the circuit ends in a full measurement.
    pub fn is_measured(&self) -> bool {
        self.gates.last() == Some(&Gate::MeasureAll)
    }

    /// Highest qubit index referenced by any gate, if any.
    pub fn max_qubit_index(&self) -> Option<usize> {
        self.gates
            .iter()
            .filter_map(|g| match *g {
                Gate::H(q) | Gate::S(q) | Gate::Sdg(q) => Some(q),
                Gate::Cx(c, t) => Some(c.max(t)),
                Gate::Barrier | Gate::MeasureAll => None,
            })
            .max()
    }
}

impl fmt::Display for QuantumCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// {}", self.name)?;
        writeln!(f, "qreg q[{}];", self.num_qubits)?;
        writeln!(f, "creg c[{}];", self.num_qubits)?;
        for gate in &self.gates {
            writeln!(f, "{gate};")?;
        }
        Ok(())
    }
}

/// All 8 labels in lexicographic order: `000, 001, ..., 111`.
pub fn mermin_labels() -> Vec<Label> {
    (0..1u8 << MERMIN_QUBITS)
        .map(|v| [(v >> 2) & 1, (v >> 1) & 1, v & 1])
        .collect()
}

/// Build the Mermin circuit for one label.
pub fn mermin_circuit(label: Label) -> QuantumCircuit {
    let name = format!("mermin_{}{}{}", label[0], label[1], label[2]);
    let mut qc = QuantumCircuit::new(name, MERMIN_QUBITS);
    qc.h(0);
    for i in 1..MERMIN_QUBITS {
        qc.cx(0, i);
    }
    qc.s(0);
    qc.barrier();
    for (i, &bit) in label.iter().enumerate() {
        if bit == 1 {
            qc.sdg(i);
        }
    }
    for i in 0..MERMIN_QUBITS {
        qc.h(i);
    }
    qc.measure_all();
    qc
}

/// Pick, for every WSR triple, the base circuit carrying the same label.
pub fn circuits_for_wsr(wsr: &[Label]) -> Vec<QuantumCircuit> {
    let base: Vec<QuantumCircuit> = mermin_labels().into_iter().map(mermin_circuit).collect();
    wsr.iter()
        .map(|label| {
            let idx = ((label[0] as usize) << 2) | ((label[1] as usize) << 1) | label[2] as usize;
            base[idx].clone()
        })
        .collect()
}
