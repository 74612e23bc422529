//! Adaptor health and readiness

use adaptor_lib::health::{HealthResponse, ReadinessResponse};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, or_dash, print_table, OutputFormat};

/// Row for components table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

#[derive(Serialize)]
struct StatusReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

fn status_label<T: Serialize>(status: &T) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Show component health and readiness of a running adaptor
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_lenient("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_lenient("readyz").await?;

    let mut components: Vec<_> = health.components.iter().collect();
    components.sort_by(|a, b| a.0.cmp(b.0));
    let rows: Vec<ComponentRow> = components
        .into_iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&status_label(&component.status)),
            message: or_dash(component.message.as_deref()),
            last_check: format_timestamp(component.last_check_timestamp),
        })
        .collect();

    if matches!(format, OutputFormat::Table) {
        println!("{}", "Adaptor Status".bold());
        println!("{}", "=".repeat(50));
        println!("Health:    {}", color_status(&status_label(&health.status)));
        let ready = if readiness.ready { "ready" } else { "not ready" };
        match &readiness.reason {
            Some(reason) => println!("Readiness: {} ({})", color_status(ready), reason),
            None => println!("Readiness: {}", color_status(ready)),
        }
        println!();
    }

    print_table(rows, &StatusReport { health, readiness }, format)
}
