use birdglass::{
    source, GlassConfig, LookupRoute, OutputFormat, SourceId, DEFAULT_DESCRIPTION_MAX_LEN,
};
use clap::Args;
use tabled::Tabled;
use tracing::warn;

/// Arguments for the Prefix command
#[derive(Args)]
pub struct PrefixArgs {
    /// Prefix to look up, e.g. 192.0.2.0/24
    #[clap()]
    pub prefix: String,

    /// Only query these route servers (may be repeated)
    #[clap(short, long)]
    pub source: Vec<SourceId>,
}

#[derive(Tabled)]
struct PrefixRow {
    route_server: String,
    network: String,
    neighbour: String,
    gateway: String,
    as_path: String,
    state: String,
}

impl From<&LookupRoute> for PrefixRow {
    fn from(r: &LookupRoute) -> Self {
        let neighbour = match &r.neighbour {
            Some(n) => birdglass::truncate_name(
                &format!("AS{} {}", n.asn, n.description),
                DEFAULT_DESCRIPTION_MAX_LEN,
            ),
            None => r.neighbour_id.clone(),
        };
        Self {
            route_server: r.route_server.name.clone(),
            network: r.network.clone(),
            neighbour,
            gateway: r.gateway.clone(),
            as_path: r.bgp.as_path_string(),
            state: r.state.clone(),
        }
    }
}

pub fn run(config: &GlassConfig, args: PrefixArgs, format: OutputFormat) {
    let PrefixArgs {
        prefix,
        source: only,
    } = args;

    let mut routes: Vec<LookupRoute> = vec![];
    for source_config in config
        .sources
        .iter()
        .filter(|c| only.is_empty() || only.contains(&c.id))
    {
        let rs = match source::from_config(source_config, &config.cache) {
            Ok(rs) => rs,
            Err(e) => {
                warn!("skipping route server {}: {}", source_config.name, e);
                continue;
            }
        };
        // neighbour annotations come from the neighbours cache
        if let Err(e) = rs.neighbours() {
            warn!("unable to load neighbours of {}: {}", rs.name(), e);
        }
        match rs.lookup_prefix(&prefix) {
            Ok(response) => routes.extend(response.routes),
            Err(e) => warn!("prefix lookup on {} failed: {}", rs.name(), e),
        }
    }

    super::print_rows(&routes, format, |r| PrefixRow::from(r));
}
