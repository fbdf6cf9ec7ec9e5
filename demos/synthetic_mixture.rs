use marker_decon::{decompose, DecompositionConfig, ExpressionTable, MarkerEntry, MarkerTable};
use ndarray::array;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two cell types, two markers each, five samples.
    // T-cell markers rise across the samples, B-cell markers fall.
    let bulk = ExpressionTable::new(
        array![
            [1.0, 3.0, 5.0, 7.0, 9.0],
            [2.0, 3.5, 6.0, 7.5, 10.0],
            [8.0, 7.0, 5.5, 3.0, 1.0],
            [9.0, 6.5, 5.0, 3.5, 2.0],
            [4.0, 4.2, 3.9, 4.1, 4.0],
        ],
        vec!["CD3E".into(), "CD3D".into(), "MS4A1".into(), "CD79A".into(), "ACTB".into()],
        (1..=5).map(|s| format!("sample{}", s)).collect(),
    )?;
    let markers = MarkerTable::from_entries(&[
        MarkerEntry::new("T", "CD3E", Some(2.1)),
        MarkerEntry::new("T", "CD3D", Some(1.8)),
        MarkerEntry::new("B", "MS4A1", Some(2.5)),
        MarkerEntry::new("B", "CD79A", Some(2.2)),
    ]);

    let config = DecompositionConfig::default().with_gene_bounds(2, 10);
    let result = decompose(&bulk, &markers, &config)?;

    println!("Marker decomposition works!");
    println!("Score matrix shape: {:?}", result.proportions.dim());
    for cell_type in &result.cell_types {
        println!(
            "{}: variance explained {:.3}, genes {:?}",
            cell_type, result.variance_explained[cell_type], result.genes_used[cell_type]
        );
    }
    result.write_proportions_tsv(std::io::stdout())?;
    Ok(())
}
