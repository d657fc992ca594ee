//! Knowledge-store statistics.
//!
//! A quick overview of what is stored: unit counts, per-disease and
//! per-category breakdowns, and the registry and embedder in use. Used by
//! `ckb stats`.

use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeStore;

pub async fn run_stats(config: &Config, store: &KnowledgeStore) -> Result<()> {
    let total = store.count(None).await?;
    let summary = store.metadata_summary().await?;
    let registered = store.validator().registered_ids().map(|ids| ids.len());

    println!("Chronic KB: store stats");
    println!("========================");
    println!();
    println!("  Engine:      {}", store.engine_name());
    if store.engine_name() == "sqlite" {
        let size = std::fs::metadata(&config.store.path)
            .map(|m| m.len())
            .unwrap_or(0);
        println!("  Database:    {}", config.store.path.display());
        println!("  Size:        {}", format_bytes(size));
    }
    println!(
        "  Embedder:    {} ({} dims)",
        store.embedder().model_name(),
        store.embedder().dims()
    );
    match registered {
        Ok(n) => println!(
            "  Registry:    {} ({} sources)",
            store.validator().registry_location(),
            n
        ),
        Err(e) => println!("  Registry:    {}", e),
    }
    println!();
    println!("  Units:       {}", total);

    print_breakdown("DISEASE", &summary.diseases);
    print_breakdown("CATEGORY", &summary.categories);
    println!();
    Ok(())
}

fn print_breakdown(label: &str, counts: &std::collections::BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    let mut rows: Vec<(&String, &usize)> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    println!();
    println!("  {:<32} {:>6}", label, "UNITS");
    println!("  {}", "-".repeat(39));
    for (name, n) in rows {
        println!("  {:<32} {:>6}", name, n);
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
