use super::neighbours::NeighbourRow;
use birdglass::{GlassConfig, NeighboursStore, OutputFormat};
use clap::Args;
use tabled::Tabled;

/// Arguments for the Lookup command
#[derive(Args)]
pub struct LookupArgs {
    /// Text to search for in neighbour descriptions (case-insensitive)
    #[clap()]
    pub query: String,
}

#[derive(Tabled)]
struct LookupRow {
    route_server: String,
    #[tabled(inline)]
    neighbour: NeighbourRow,
}

pub fn run(config: &GlassConfig, args: LookupArgs, format: OutputFormat) {
    let store = match NeighboursStore::from_config(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return;
        }
    };

    let updated = store.refresh_all();
    if updated < store.source_ids().len() {
        for rs in store.stats().route_servers {
            if let Some(e) = rs.last_error {
                eprintln!("WARNING: route server {} unavailable: {e}", rs.name);
            }
        }
    }

    let results = store.lookup_neighbours(&args.query);
    if format.is_json() {
        println!("{}", format.json(&results));
        return;
    }

    let rows: Vec<LookupRow> = results
        .iter()
        .flat_map(|(id, neighbours)| {
            let name = store
                .source(*id)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| id.to_string());
            neighbours.iter().map(move |n| LookupRow {
                route_server: name.clone(),
                neighbour: NeighbourRow::from(n),
            })
        })
        .collect();
    println!("{}", format.table(&rows));
}
