use approx::assert_abs_diff_eq;

use avifauna_core::cache::{load_municipalities, load_taxonomy};
use avifauna_core::{
    ClusterConfig, ClusterError, ClusterPipeline, ClusterReport, ExclusionReason, Municipality,
    OccurrenceRecord, TaxonLevel,
};

fn muni(name: &str, orders: &[(&str, usize)]) -> Municipality {
    let records = orders
        .iter()
        .flat_map(|(order, n)| {
            (0..*n).map(move |i| OccurrenceRecord::new(format!("{order}-sp{i}"), format!("{order}-fam"), *order))
        })
        .collect();
    Municipality::new(name, format!("BR-RJ-{name}"), records)
}

fn config(k: usize, seed: u64) -> ClusterConfig {
    ClusterConfig { level: TaxonLevel::Order, clusters: k, seed, ..Default::default() }
}

#[test]
fn disjoint_orders_split_into_separate_clusters() {
    let input = vec![muni("A", &[("order1", 10)]), muni("B", &[("order2", 10)])];
    let run = ClusterPipeline::new(config(2, 0)).run(&input).unwrap();

    let (a, b) = (run.assignment["A"], run.assignment["B"]);
    assert_ne!(a, b);
    assert_eq!(run.signatures[&a][0].taxon, "order1");
    assert_eq!(run.signatures[&a][0].weight, 10);
    assert_eq!(run.signatures[&b][0].taxon, "order2");
    assert!(run.diagnostics.converged());
}

#[test]
fn all_zero_municipality_is_excluded_without_disturbing_the_rest() {
    let input = vec![muni("A", &[("order1", 10)]), muni("B", &[("order2", 10)]), muni("C", &[])];
    let run = ClusterPipeline::new(config(2, 0)).run(&input).unwrap();

    assert_eq!(run.diagnostics.exclusion("C"), Some(&ExclusionReason::Degenerate));
    assert!(!run.assignment.contains_key("C"));
    assert_ne!(run.assignment["A"], run.assignment["B"]);

    let report = ClusterReport::from_run(&run);
    let csv = report.to_csv_string().unwrap();
    assert!(csv.lines().any(|l| l.starts_with("C;BR-RJ-C;NA;0;")));
}

#[test]
fn cluster_count_outside_valid_range_is_rejected() {
    let input = vec![muni("A", &[("order1", 3)]), muni("B", &[("order2", 3)]), muni("C", &[])];
    for k in [0, 1, 3, 10] {
        let err = ClusterPipeline::new(config(k, 0)).run(&input).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidClusterCount { requested, .. } if requested == k));
    }
}

fn mixed_input() -> Vec<Municipality> {
    vec![
        muni("Angra dos Reis", &[("Charadriiformes", 12), ("Passeriformes", 4)]),
        muni("Armação dos Búzios", &[("Charadriiformes", 9), ("Suliformes", 3)]),
        muni("Cabo Frio", &[("Charadriiformes", 15), ("Suliformes", 2), ("Passeriformes", 1)]),
        muni("Itatiaia", &[("Passeriformes", 30), ("Apodiformes", 6)]),
        muni("Nova Friburgo", &[("Passeriformes", 25), ("Apodiformes", 4), ("Piciformes", 3)]),
        muni("Petrópolis", &[("Passeriformes", 28), ("Piciformes", 5)]),
        muni("Resende", &[("Passeriformes", 10), ("Accipitriformes", 8)]),
        muni("Teresópolis", &[("Passeriformes", 22), ("Apodiformes", 7)]),
    ]
}

#[test]
fn identical_runs_serialize_identically() {
    let input = mixed_input();
    let render = || {
        let run = ClusterPipeline::new(config(3, 42)).run(&input).unwrap();
        let report = ClusterReport::from_run(&run);
        (report.to_csv_string().unwrap(), report.summary_json().unwrap())
    };
    let (csv1, json1) = render();
    let (csv2, json2) = render();
    assert_eq!(csv1, csv2);
    assert_eq!(json1, json2);
}

#[test]
fn every_eligible_municipality_lands_in_exactly_one_cluster() {
    let mut input = mixed_input();
    input.push(muni("Vazio", &[]));
    for seed in [0, 1, 7, 99] {
        let run = ClusterPipeline::new(config(3, seed)).run(&input).unwrap();
        let mut seen: Vec<&str> = (0..3).flat_map(|c| run.members(c)).collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = run.features.vectors.keys().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected, "seed {seed}");
        assert_eq!(seen.len(), 8);
        assert!(run.assignment.values().all(|&c| c < 3));
    }
}

#[test]
fn scaled_count_vectors_are_indistinguishable() {
    let input = vec![
        muni("X1", &[("o1", 3), ("o2", 4)]),
        muni("X2", &[("o1", 6), ("o2", 8)]),
        muni("Y1", &[("o1", 5), ("o2", 12)]),
        muni("Y2", &[("o1", 10), ("o2", 24)]),
    ];
    for seed in [0, 5, 11] {
        let run = ClusterPipeline::new(config(2, seed)).run(&input).unwrap();
        let x1 = &run.features.vectors["X1"];
        let x2 = &run.features.vectors["X2"];
        for (a, b) in x1.iter().zip(x2) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_eq!(run.assignment["X1"], run.assignment["X2"], "seed {seed}");
        assert_eq!(run.assignment["Y1"], run.assignment["Y2"], "seed {seed}");
    }
}

#[test]
fn k_equal_to_distinct_municipalities_gives_singletons() {
    let input = vec![
        muni("A", &[("o1", 4)]),
        muni("B", &[("o2", 4)]),
        muni("C", &[("o3", 4)]),
    ];
    let run = ClusterPipeline::new(config(3, 8)).run(&input).unwrap();
    for c in 0..3 {
        assert_eq!(run.members(c).len(), 1);
    }
}

#[test]
fn cached_files_feed_the_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let taxonomy = dir.path().join("taxonomy_BR-RJ_pt_BR.json");
    let species = dir.path().join("municipio_species_BR-RJ.json");
    std::fs::write(
        &taxonomy,
        r#"[
            {"speciesCode": "kelgul", "order": "Charadriiformes", "familySciName": "Laridae"},
            {"speciesCode": "royter1", "order": "Charadriiformes", "familySciName": "Laridae"},
            {"speciesCode": "rufhor2", "order": "Passeriformes", "familySciName": "Passerellidae"},
            {"speciesCode": "grekis", "order": "Passeriformes", "familySciName": "Tyrannidae"}
        ]"#,
    )
    .unwrap();
    std::fs::write(
        &species,
        r#"[
            {"name": "Cabo Frio", "code": "BR-RJ-3300704", "species": ["kelgul", "royter1", "rufhor2"]},
            {"name": "Petrópolis", "code": "BR-RJ-3303906", "species": ["rufhor2", "grekis", "unlisted"]},
            {"name": "Sem registros", "code": "BR-RJ-0000000", "species": []}
        ]"#,
    )
    .unwrap();

    let tax = load_taxonomy(&taxonomy).unwrap();
    let input = load_municipalities(&species, &tax).unwrap();
    let run = ClusterPipeline::new(config(2, 0)).run(&input).unwrap();
    assert_ne!(run.assignment["Cabo Frio"], run.assignment["Petrópolis"]);
    assert_eq!(run.diagnostics.data_gaps.get("Petrópolis"), Some(&1));
    assert_eq!(run.municipalities["Petrópolis"].richness, 3);

    let out = dir.path().join("outputs").join("municipio_clusters.csv");
    let summary = ClusterReport::from_run(&run).write_files(&out).unwrap();
    let csv = std::fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 4);
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(summary).unwrap()).unwrap();
    assert_eq!(json["k"], 2);
}
