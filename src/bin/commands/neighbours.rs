use birdglass::{
    format_duration, truncate_name, GlassConfig, Neighbour, NeighboursStore, OutputFormat,
    RefreshOutcome, SourceId, DEFAULT_DESCRIPTION_MAX_LEN,
};
use clap::Args;
use tabled::Tabled;

/// Arguments for the Neighbours command
#[derive(Args)]
pub struct NeighboursArgs {
    /// Route server id
    #[clap()]
    pub source: SourceId,

    /// Only show neighbours whose description contains this text
    #[clap(short, long)]
    pub query: Option<String>,

    /// Only show established sessions
    #[clap(long)]
    pub up: bool,
}

#[derive(Tabled)]
pub(crate) struct NeighbourRow {
    id: String,
    asn: u32,
    address: String,
    state: String,
    uptime: String,
    received: u64,
    accepted: u64,
    filtered: u64,
    exported: u64,
    description: String,
}

impl From<&Neighbour> for NeighbourRow {
    fn from(n: &Neighbour) -> Self {
        Self {
            id: n.id.clone(),
            asn: n.asn,
            address: n.address.clone(),
            state: n.state.clone(),
            uptime: format_duration(n.uptime),
            received: n.routes_received,
            accepted: n.routes_accepted,
            filtered: n.routes_filtered,
            exported: n.routes_exported,
            description: truncate_name(&n.description, DEFAULT_DESCRIPTION_MAX_LEN),
        }
    }
}

pub fn run(config: &GlassConfig, args: NeighboursArgs, format: OutputFormat) {
    let NeighboursArgs { source, query, up } = args;

    let store = match NeighboursStore::from_config(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return;
        }
    };

    match store.update_source(source) {
        RefreshOutcome::Updated(_) => {}
        RefreshOutcome::Failed(e) => {
            eprintln!("ERROR: unable to load neighbours of route server {source}: {e}");
            return;
        }
        RefreshOutcome::Skipped => {
            eprintln!("ERROR: no route server with id {source} configured");
            return;
        }
    }

    let mut neighbours = match &query {
        Some(q) => store.lookup_neighbours_at(source, q),
        None => store.neighbours_at(source),
    };
    if up {
        neighbours.retain(|n| n.is_up());
    }

    super::print_rows(&neighbours, format, |n| NeighbourRow::from(n));
}
