//! CLI entry point.
//!
//! # Responsibility
//! - Without arguments: print a deterministic core linkage check.
//! - With a config path: list the nodes and connections of the configured graph.

use nodegraph_core::db::{open_db, open_db_in_memory};
use nodegraph_core::{init_logging_from_config, GraphConfig, GraphStore, SqliteRecordStore};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        println!("nodegraph_core ping={}", nodegraph_core::ping());
        println!("nodegraph_core version={}", nodegraph_core::core_version());
        return ExitCode::SUCCESS;
    };

    match list_graph(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn list_graph(config_path: &str) -> Result<(), Box<dyn Error>> {
    let config = GraphConfig::load(config_path)?;
    init_logging_from_config(&config)?;

    let conn = match &config.database_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let graph = GraphStore::with_config(SqliteRecordStore::try_new(&conn)?, &config);

    for node in graph.nodes() {
        println!(
            "{}\t{}\tneighbors={}",
            node.name,
            node.position_description(),
            graph.nodes_connected_with(node).len()
        );
    }
    println!(
        "nodes={} connections={}",
        graph.nodes().len(),
        graph.connections().len()
    );
    log::info!(
        "event=cli_list module=cli status=ok nodes={} connections={}",
        graph.nodes().len(),
        graph.connections().len()
    );
    Ok(())
}
