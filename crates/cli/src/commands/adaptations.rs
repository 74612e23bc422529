//! Adaptation history of a running adaptor

use adaptor_lib::response::Response;
use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, or_dash, print_table, OutputFormat};

/// Row for adaptations table
#[derive(Tabled)]
struct AdaptationRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Guarantee")]
    guarantee: String,
    #[tabled(rename = "Term")]
    term: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Details")]
    details: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Lifecycle state of a response as shown to operators
fn state_of(response: &Response) -> &'static str {
    match (response.performed, response.possible_to_adapt) {
        (true, true) => "performed",
        (true, false) => "failed",
        (false, false) => "infeasible",
        (false, true) => "pending",
    }
}

fn target_of(response: &Response) -> String {
    let app = match (&response.application_id, &response.deployment_id) {
        (Some(app), Some(dep)) if !dep.is_empty() => Some(format!("{}/{}", app, dep)),
        (Some(app), _) => Some(app.clone()),
        _ => None,
    };
    let parts: Vec<String> = [app, response.task_id.clone(), response.host_name.clone()]
        .into_iter()
        .flatten()
        .collect();
    or_dash(Some(parts.join(" ").as_str()))
}

fn history_path(limit: Option<usize>, guarantee_id: Option<&str>) -> String {
    let mut query = Vec::new();
    if let Some(limit) = limit {
        query.push(format!("limit={}", limit));
    }
    if let Some(gid) = guarantee_id {
        query.push(format!("guarantee_id={}", gid));
    }
    if query.is_empty() {
        "api/v1/adaptations".to_string()
    } else {
        format!("api/v1/adaptations?{}", query.join("&"))
    }
}

/// Show the live adaptation history, newest last
pub async fn show_adaptations(
    client: &ApiClient,
    limit: Option<usize>,
    guarantee_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let history: Vec<Response> = client
        .get(&history_path(limit, guarantee_id.as_deref()))
        .await?;

    let rows: Vec<AdaptationRow> = history
        .iter()
        .map(|r| AdaptationRow {
            id: r.id,
            time: format_timestamp(r.time),
            guarantee: r.guarantee_id().to_string(),
            term: r.agreement_term().to_string(),
            action: r.action_type.to_string(),
            target: target_of(r),
            details: or_dash(Some(r.adaptation_details.as_str())),
            state: match &r.reason {
                Some(reason) => format!("{} ({})", color_status(state_of(r)), reason),
                None => color_status(state_of(r)),
            },
        })
        .collect();

    print_table(rows, &history, format)?;
    if matches!(format, OutputFormat::Table) && !history.is_empty() {
        println!("\nTotal: {} adaptations", history.len());
    }
    Ok(())
}
