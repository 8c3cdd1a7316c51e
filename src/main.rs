use tree_window::*;
use std::{sync::Arc, time};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[derive(Debug, Clone)]
struct Row {
    path: Vec<usize>,
    label: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("== Tree window scroll ==\n");
    let start = time::Instant::now();
    let provider = Arc::new(InMemoryTreeProvider::uniform(
        &[10_000, 20, 5],
        |row: &Row| row.path.clone(),
        |path| Row {
            path: path.to_vec(),
            label: format!("node {path:?}"),
        },
    ));
    println!("provider built with {} items in {:?}", provider.len(), start.elapsed());

    let mut communicator = TreeDataCommunicator::new(
        Arc::clone(&provider),
        |row: &Row| row.path.clone(),
        WindowConfig::default(),
    )?;

    let rows = communicator.fetch_rows(0, 10)?;
    let to_expand: Vec<Arc<Row>> = rows.iter().step_by(3).map(|row| Arc::clone(&row.item)).collect();
    let expanded = communicator.expand(to_expand)?;
    println!("expanded {} rows, flat size now {}", expanded.len(), communicator.flat_size());

    for step in 0..20 {
        let begin = step * 400;
        let started = time::Instant::now();
        let window = communicator.set_viewport_range(begin, 100)?;
        let stats = communicator.stats();
        println!(
            "  viewport {:>6}..{:<6} loaded {:>5} items in {} nodes, fetches {:>4}, took {:?}",
            window.start,
            window.end,
            stats.loaded_items,
            stats.node_count,
            provider.fetch_count(),
            started.elapsed()
        );
    }

    let resolved = communicator.resolve_index_path(&[-1, 19, 4])?;
    println!("\nexpanded {} ancestors on the way", resolved.expanded.len());
    if let Some(flat_index) = resolved.flat_index {
        let rows = communicator.fetch_rows(flat_index, 1)?;
        if let Some(row) = rows.first() {
            println!("\nlast leaf at flat index {flat_index}: {} (depth {})", row.item.label, row.depth);
        }
    }

    println!("\n✓ Done, flat size {}", communicator.flat_size());
    Ok(())
}
