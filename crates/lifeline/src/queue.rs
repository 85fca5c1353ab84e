// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline queue` command implementation.

use lifeline_config::LifelineConfig;
use lifeline_core::types::MutationStatus;
use lifeline_core::{Domain, LifelineError, PendingMutation, StorageAdapter};

/// One table row per queued mutation.
fn format_row(mutation: &PendingMutation) -> String {
    format!(
        "  {:>5}  {:<9} {:<24} {:<10} {:>8}  {}",
        mutation.id,
        mutation.domain.to_string(),
        mutation.payload.op_name(),
        mutation.status.to_string(),
        mutation.attempt_count,
        mutation.enqueued_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

fn format_table(mutations: &[PendingMutation]) -> Vec<String> {
    let mut lines = vec![format!(
        "  {:>5}  {:<9} {:<24} {:<10} {:>8}  {}",
        "id", "domain", "operation", "status", "attempts", "enqueued"
    )];
    lines.extend(mutations.iter().map(format_row));
    lines
}

/// Run the `lifeline queue` command.
pub async fn run_queue(
    config: &LifelineConfig,
    domain: Option<Domain>,
) -> Result<(), LifelineError> {
    let storage = crate::open_storage(config).await?;
    let mutations = storage.list_mutations(domain).await;
    storage.close().await?;
    let mutations = mutations?;

    if mutations.is_empty() {
        println!("lifeline: offline queue is empty");
        return Ok(());
    }
    for line in format_table(&mutations) {
        println!("{line}");
    }
    let failed = mutations
        .iter()
        .filter(|m| m.status == MutationStatus::Failed)
        .count();
    println!();
    println!("  {} waiting, {failed} failed", mutations.len() - failed);
    Ok(())
}
