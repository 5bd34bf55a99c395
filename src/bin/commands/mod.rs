pub mod lookup;
pub mod neighbours;
pub mod prefix;
pub mod routes;
pub mod serve;
pub mod status;

use anyhow::{anyhow, Result};
use birdglass::{source, GlassConfig, OutputFormat, Source, SourceId};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

/// Build the configured source with the given id
pub(crate) fn open_source(config: &GlassConfig, id: SourceId) -> Result<Arc<dyn Source>> {
    let source_config = config
        .source(id)
        .ok_or_else(|| anyhow!("no route server with id {} configured", id))?;
    source::from_config(source_config, &config.cache)
        .map_err(|e| anyhow!("unable to set up route server {}: {}", source_config.name, e))
}

/// Print `values` as JSON, or their table rows otherwise
pub(crate) fn print_rows<T, R>(values: &[T], format: OutputFormat, to_row: impl Fn(&T) -> R)
where
    T: Serialize,
    R: Tabled,
{
    if format.is_json() {
        println!("{}", format.json_list(values));
    } else {
        let rows: Vec<R> = values.iter().map(to_row).collect();
        println!("{}", format.table(&rows));
    }
}
