//! `incident create|link|search`: Layer-3 management.
//!
//! Incidents live in both stores: the staging row (searchable) is written
//! first, then the graph node, so the two always agree on the id.

use chrono::Utc;
use colored::Colorize;
use uuid::Uuid;

use coderisk_core::{ids, CodeRiskError, EdgeKind, Result, Severity};
use coderisk_graph::model::incident_node;
use coderisk_graph::{GraphBackend, GraphEdge};
use coderisk_staging::{IncidentFileRow, IncidentRow};
use serde_json::json;

use crate::context::AppContext;

pub async fn create(
    ctx: AppContext,
    title: String,
    severity: Severity,
    description: Option<String>,
) -> Result<i32> {
    let row = IncidentRow {
        id: Uuid::new_v4(),
        title: title.clone(),
        description: description.unwrap_or_default(),
        severity,
        occurred_at: Utc::now(),
        resolved_at: None,
        root_cause: None,
    };
    ctx.staging.create_incident(&ctx.repo_id, &row)?;
    ctx.backend
        .upsert_node(&incident_node(
            &row.id,
            &row.title,
            row.severity,
            row.occurred_at,
            None,
            None,
        ))
        .await?;

    println!("incident {} created: {}", row.id, title.bold());
    Ok(0)
}

pub async fn link(
    ctx: AppContext,
    id: String,
    path: String,
    line: Option<u32>,
    function: Option<String>,
) -> Result<i32> {
    let incident_id = Uuid::parse_str(&id)
        .map_err(|_| CodeRiskError::Input(format!("not an incident id: {}", id)))?;
    if ctx.staging.incident(&ctx.repo_id, &incident_id)?.is_none() {
        return Err(CodeRiskError::Input(format!("unknown incident: {}", id)));
    }

    // the graph wants the absolute path under the ingested clone root
    let absolute = ctx.clone_root.join(&path).to_string_lossy().to_string();

    ctx.staging.link_incident(
        &ctx.repo_id,
        &IncidentFileRow {
            incident_id,
            file_path: absolute.clone(),
            confidence: 1.0, // manual links are authoritative
            line_number: line,
            blamed_function: function.clone(),
        },
    )?;

    let mut edge = GraphEdge::new(
        EdgeKind::CausedBy,
        ids::incident_id(&incident_id),
        ids::file_id(&absolute),
    )
    .with_prop("confidence", json!(1.0));
    if let Some(l) = line {
        edge = edge.with_prop("line_number", json!(l));
    }
    if let Some(f) = &function {
        edge = edge.with_prop("blamed_function", json!(f));
    }
    match ctx.backend.upsert_edge(&edge).await {
        Ok(()) => println!("linked incident {} to {}", id, path),
        Err(CodeRiskError::EndpointMissing(_)) => {
            println!(
                "{}",
                format!(
                    "staged link for {}, but {} is not in the graph yet (run `coderisk init`)",
                    id, path
                )
                .yellow()
            );
        }
        Err(e) => return Err(e),
    }
    Ok(0)
}

pub fn search(ctx: AppContext, query: String) -> Result<i32> {
    let hits = ctx.staging.search_incidents(&query, 10)?;
    if hits.is_empty() {
        println!("no incidents match \"{}\"", query);
        return Ok(0);
    }
    for hit in hits {
        println!("{}  {}", hit.id.dimmed(), hit.title.bold());
        if !hit.snippet.is_empty() {
            println!("    {}", hit.snippet);
        }
    }
    Ok(0)
}
