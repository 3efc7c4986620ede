//! Offline analysis of the bundled fixture
//!
//! No model and no database: every record is built from the function body
//! and written as JSON files under `./analysis`.

use testlens::{AnalysisRecord, Config, DirectoryStore, DocumentStore, GeneratorKind, Pipeline, StoreKind};

fn main() -> anyhow::Result<()> {
    let output_dir = "./analysis";

    let config = Config::builder()
        .source_file("fixtures/test_file.py")
        .generator(GeneratorKind::Offline)
        .store_kind(StoreKind::Directory)
        .output_dir(output_dir)
        .backup_existing(false)
        .build()?;

    let stats = Pipeline::new(config)?.run()?;
    stats.print_summary();

    // Read one document back
    let store = DirectoryStore::new(output_dir, false);
    if let Some(document) = store.get("test_rebalance_in_during_index_building")? {
        if let Some(record) = AnalysisRecord::from_document(&document, "test") {
            println!("Steps for test_rebalance_in_during_index_building:");
            for step in &record.steps {
                println!("  - {step}");
            }
        }
    }

    println!("\n✓ Stored {} of {} analyses in {}", stats.stored, stats.functions_found, output_dir);

    Ok(())
}
