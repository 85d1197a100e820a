use criterion::{Criterion, criterion_group, criterion_main};
use pypsa_helper_bot::embeddings::{ChunkingConfig, chunk_documents, split_text};
use pypsa_helper_bot::sources::Document;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::hint::black_box;

fn python_module(classes: usize) -> String {
    let mut source = String::from("import pandas as pd\nimport pypsa\n\n");
    for i in 0..classes {
        let _ = write!(
            source,
            "\nclass Component{i}:\n    \"\"\"Component {i} of the network.\"\"\"\n\n\tdef __init__(self, network):\n        self.network = network\n        self.snapshots = network.snapshots\n\n\tdef optimize(self, solver_name=\"highs\"):\n        for bus in self.network.buses.index:\n            self.network.generators_t.p_max_pu[bus] = 0.5 * {i}\n        return self.network.optimize(solver_name=solver_name)\n\ndef helper_{i}(n):\n    return n.lines.s_nom.sum() + {i}\n"
        );
    }
    source
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let config = ChunkingConfig::default();
    let module = python_module(200);

    c.bench_function("split_python_module", |b| {
        b.iter(|| split_text(black_box(&module), black_box(&config)))
    });

    let documents: Vec<Document> = (0..20)
        .map(|i| {
            let mut metadata = BTreeMap::new();
            metadata.insert("source".to_string(), format!("scripts/module_{i}.py"));
            metadata.insert("repository".to_string(), "pypsa-eur".to_string());
            Document::new(python_module(20), metadata)
        })
        .collect();

    c.bench_function("chunk_documents", |b| {
        b.iter(|| chunk_documents(black_box(&documents), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
