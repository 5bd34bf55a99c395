use super::open_source;
use birdglass::{GlassConfig, OutputFormat, SourceId, StatusResponse};
use clap::Args;
use tabled::Tabled;

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// Route server id
    #[clap()]
    pub source: SourceId,
}

#[derive(Tabled)]
struct StatusRow {
    field: &'static str,
    value: String,
}

fn time_or_unknown(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "unknown".to_string())
}

fn status_rows(response: &StatusResponse) -> Vec<StatusRow> {
    let status = &response.status;
    vec![
        StatusRow {
            field: "router_id",
            value: status.router_id.clone(),
        },
        StatusRow {
            field: "version",
            value: status.version.clone(),
        },
        StatusRow {
            field: "backend",
            value: status.backend.clone(),
        },
        StatusRow {
            field: "server_time",
            value: time_or_unknown(status.server_time),
        },
        StatusRow {
            field: "last_reboot",
            value: time_or_unknown(status.last_reboot),
        },
        StatusRow {
            field: "last_reconfig",
            value: time_or_unknown(status.last_reconfig),
        },
        StatusRow {
            field: "message",
            value: status.message.clone(),
        },
        StatusRow {
            field: "cache_ttl",
            value: response.api.ttl.to_rfc3339(),
        },
    ]
}

pub fn run(config: &GlassConfig, args: StatusArgs, format: OutputFormat) {
    let source = match open_source(config, args.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return;
        }
    };

    match source.status() {
        Ok(response) => {
            if format.is_json() {
                println!("{}", format.json(&response));
            } else {
                println!("{}", format.table(&status_rows(&response)));
            }
        }
        Err(e) => eprintln!("ERROR: unable to get status of {}: {e}", source.name()),
    }
}
