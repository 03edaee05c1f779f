/**
 * Kennelsync Demo Entry Point
 *
 * Runs the sync core against an in-process remote store: an initial load,
 * a local check-in, a conflicting edit by another client and a manual sync.
 *
 * Usage: kennelsync-demo [config.toml]
 */

use std::sync::Arc;

use chrono::{Duration, Utc};
use kennelsync::remote::InMemoryRemoteStore;
use kennelsync::shared::config::SyncConfig;
use kennelsync::shared::model::{ActivityEntry, Actor, ActorRole, FeedingRecord, Profile, Session};
use kennelsync::sync::{SyncEngine, SyncOutcome};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::from_file(&path)?,
        None => SyncConfig::default(),
    }
    .with_env_overrides()?;
    tracing::info!(?config, "[STARTUP] Configuration loaded");

    let remote = Arc::new(InMemoryRemoteStore::new());

    // Another front desk already checked Luna in.
    let other_desk = Actor::new("reception-2", ActorRole::Staff);
    let mut luna = Profile::new("Luna", "Sam Carter");
    luna.touch(Some(&other_desk));
    let mut luna_stay = Session::new(luna.id, Utc::now() - Duration::hours(3));
    luna_stay.touch(Some(&other_desk));
    let luna_stay_id = luna_stay.id;
    remote.seed_profile(luna);
    remote.seed_session(luna_stay);

    let engine = SyncEngine::new(remote.clone(), config);
    report("initial load", engine.initial_load().await?);

    let rex = Profile::new("Rex", "Jordan Lee");
    let rex_stay = Session::new(rex.id, Utc::now());
    let rex_id = rex.id;
    engine.add_profile_with_session(rex, rex_stay.clone()).await?;
    tracing::info!(%rex_id, "[DEMO] Rex checked in");

    // A second check-in for Rex is refused.
    let again = Session::new(rex_id, Utc::now());
    if let Err(e) = engine.add_session_for_profile(again).await {
        println!("second check-in refused: {}", e.user_message());
    }

    engine
        .append_activity(rex_stay.id, ActivityEntry::Feeding(FeedingRecord::new(Utc::now())))
        .await?;

    // The other desk checks Luna out and adds a note while this client
    // still shows her as checked in.
    remote.modify_session(luna_stay_id, |session| {
        session.departed_at = Some(Utc::now());
        session.notes = "Picked up early by owner".to_string();
        session.last_modified_by = Some(other_desk.clone());
    });

    report("manual sync", engine.trigger_manual_sync().await?);

    println!("checked in now:");
    for view in engine.current_sessions_with_profiles() {
        println!("  {} (owner {}), since {}", view.profile.name, view.profile.owner_name, view.session.arrived_at);
    }

    println!("on the remote board (open or recently closed):");
    for session in engine.fetch_active_sessions().await? {
        let state = if session.is_open() { "open" } else { "closed" };
        println!("  session {} ({})", session.id, state);
    }

    let status = engine.get_sync_status();
    println!("sync status:\n{}", serde_json::to_string_pretty(&status)?);

    let integrity = engine.validate_against_remote().await?;
    println!("integrity report:\n{}", serde_json::to_string_pretty(&integrity)?);

    engine.shutdown();
    Ok(())
}

fn report(label: &str, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => {
            println!(
                "{}: {} inserted, {} updated, {} unchanged, {} skipped",
                label,
                report.inserted,
                report.updated,
                report.unchanged,
                report.skipped_pending.len()
            );
            for entity in &report.conflicts {
                if let Some(message) = &entity.user_message {
                    println!("  conflict on {} {}: {}", entity.entity, entity.entity_id, message);
                }
            }
        }
        SyncOutcome::Skipped(reason) => println!("{}: skipped ({:?})", label, reason),
    }
}
