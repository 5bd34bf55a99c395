use super::open_source;
use birdglass::{
    format_duration, GlassConfig, OutputFormat, Route, RoutesResponse, SourceId, SourceResult,
};
use clap::{Args, ValueEnum};
use tabled::Tabled;

/// Which part of a neighbour's routes to show
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RoutesFacet {
    /// Imported, filtered and not exported routes
    #[default]
    All,
    /// Routes accepted into the master table
    Received,
    /// Routes rejected by import filters
    Filtered,
    /// Routes withheld from export
    NotExported,
}

/// Arguments for the Routes command
#[derive(Args)]
pub struct RoutesArgs {
    /// Route server id
    #[clap()]
    pub source: SourceId,

    /// Neighbour (protocol) id
    #[clap()]
    pub neighbour: String,

    /// Which routes to show
    #[clap(long, value_enum, default_value_t = RoutesFacet::All)]
    pub facet: RoutesFacet,
}

#[derive(Tabled)]
struct RouteRow {
    state: &'static str,
    network: String,
    gateway: String,
    as_path: String,
    local_pref: u32,
    med: u32,
    age: String,
}

impl RouteRow {
    fn new(state: &'static str, route: &Route) -> Self {
        Self {
            state,
            network: route.network.clone(),
            gateway: route.gateway.clone(),
            as_path: route.bgp.as_path_string(),
            local_pref: route.bgp.local_pref,
            med: route.bgp.med,
            age: format_duration(route.age),
        }
    }
}

fn fetch(
    source: &dyn birdglass::Source,
    neighbour: &str,
    facet: RoutesFacet,
) -> SourceResult<RoutesResponse> {
    match facet {
        RoutesFacet::All => source.routes(neighbour),
        RoutesFacet::Received => source.routes_received(neighbour),
        RoutesFacet::Filtered => source.routes_filtered(neighbour),
        RoutesFacet::NotExported => source
            .routes_not_exported(neighbour)
            .map(|r| r.as_ref().clone()),
    }
}

pub fn run(config: &GlassConfig, args: RoutesArgs, format: OutputFormat) {
    let RoutesArgs {
        source,
        neighbour,
        facet,
    } = args;

    let source = match open_source(config, source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return;
        }
    };

    let response = match fetch(source.as_ref(), &neighbour, facet) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: unable to get routes of {neighbour}: {e}");
            return;
        }
    };

    if format.is_json() {
        println!("{}", format.json(&response));
        return;
    }

    let rows: Vec<RouteRow> = response
        .imported
        .iter()
        .map(|r| RouteRow::new("imported", r))
        .chain(response.filtered.iter().map(|r| RouteRow::new("filtered", r)))
        .chain(
            response
                .not_exported
                .iter()
                .map(|r| RouteRow::new("not exported", r)),
        )
        .collect();
    println!("{}", format.table(&rows));
}
