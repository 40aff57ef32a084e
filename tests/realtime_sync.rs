use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use gbp_sync::{
    backend::InstrumentedBackend,
    resources::{
        AttendanceDraft, AttendanceFilters, Attendances, CategoryDraft, CategoryFilters, CategoryTypeDraft,
        CategoryTypeFilters, CategoryTypes, VoterDraft, VoterFilters, VoterPatch, Voters,
    },
    Backend, Session, SqliteBackend, SyncConfig, SyncPhase, Tenant, UserProfile,
};
use serde_json::json;

fn init_logging() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

const WAIT: Duration = Duration::from_secs(2);

fn setup(empresa: Option<Tenant>) -> anyhow::Result<(InstrumentedBackend, Session)> {
    init_logging();
    let backend = InstrumentedBackend::new(Arc::new(SqliteBackend::open_memory()?));
    let session = Session::builder()
        .backend(Arc::new(backend.clone()))
        .config(SyncConfig {
            feed_poll_interval_ms: 10,
            ..SyncConfig::default()
        })
        .login(UserProfile {
            uid: "u1".to_string(),
            nome: "Operador".to_string(),
            email: "operador@gabinete.org".to_string(),
            empresa,
        })?;
    Ok((backend, session))
}

/// Inserts a voter row the way another client would, bypassing the session.
fn insert_voter(backend: &dyn Backend, tenant: &str, nome: &str) -> anyhow::Result<String> {
    let row = json!({ "empresa_uid": tenant, "nome": nome, "usuario_uid": "u2" });
    let serde_json::Value::Object(row) = row else {
        unreachable!()
    };
    let stored = backend.insert("gbp_eleitores", row)?;
    Ok(stored["uid"].as_str().unwrap_or_default().to_string())
}

fn rename_voter(backend: &dyn Backend, uid: &str, nome: &str) -> anyhow::Result<()> {
    let serde_json::Value::Object(patch) = json!({ "nome": nome }) else {
        unreachable!()
    };
    backend.update("gbp_eleitores", &[gbp_sync::backend::Filter::eq("uid", uid)], patch)?;
    Ok(())
}

fn names(collection: &gbp_sync::RealtimeCollection<Voters>) -> Vec<String> {
    collection.data().iter().map(|v| v.nome.clone()).collect()
}

#[test]
fn update_event_from_another_client_triggers_refetch() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let ana = insert_voter(&backend, "t1", "ANA")?;

    let voters = session.voters(VoterFilters::default());
    assert_eq!(voters.phase(), SyncPhase::SubscribedIdle);
    assert_eq!(names(&voters), vec!["ANA"]);
    assert_eq!(backend.open_channel_count(), 1);

    let selects = backend.select_count();
    rename_voter(&backend, &ana, "ANA MARIA")?;

    assert!(eventually(WAIT, || names(&voters) == vec!["ANA MARIA"]));
    assert!(backend.select_count() > selects);
    assert!(eventually(WAIT, || voters.phase() == SyncPhase::SubscribedIdle));
    assert!(voters.error().is_none());
    Ok(())
}

#[test]
fn events_are_ignored_while_realtime_is_off() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let voters = session.voters(VoterFilters::default());
    assert!(voters.is_realtime());

    assert!(!voters.toggle_realtime());
    let selects = backend.select_count();
    insert_voter(&backend, "t1", "ANA")?;
    thread::sleep(Duration::from_millis(150));

    assert_eq!(backend.select_count(), selects);
    assert!(voters.data().is_empty());
    // The channel stays open while the toggle is off.
    assert_eq!(backend.open_channel_count(), 1);

    // Re-enabling does not replay the missed event.
    assert!(voters.toggle_realtime());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(backend.select_count(), selects);
    assert!(voters.data().is_empty());

    insert_voter(&backend, "t1", "BIA")?;
    assert!(eventually(WAIT, || voters.data().len() == 2));
    Ok(())
}

#[test]
fn rapid_events_converge_on_the_latest_rows() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let voters = session.voters(VoterFilters::default());

    for i in 0..20 {
        insert_voter(&backend, "t1", &format!("ELEITOR {}", i))?;
    }

    assert!(eventually(WAIT, || voters.data().len() == 20));
    assert!(eventually(WAIT, || voters.phase() == SyncPhase::SubscribedIdle));
    assert!(!voters.is_loading());
    Ok(())
}

#[test]
fn events_from_other_tenants_are_not_delivered() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let voters = session.voters(VoterFilters::default());
    let selects = backend.select_count();

    insert_voter(&backend, "t2", "OUTRO")?;
    thread::sleep(Duration::from_millis(150));
    assert_eq!(backend.select_count(), selects);
    assert!(voters.data().is_empty());
    Ok(())
}

#[test]
fn tenant_switch_replaces_the_channel_and_reloads() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete Centro")))?;
    insert_voter(&backend, "t1", "ANA")?;
    insert_voter(&backend, "t2", "BRUNO")?;
    insert_voter(&backend, "t2", "CARLA")?;

    let voters = session.voters(VoterFilters::default());
    assert_eq!(names(&voters), vec!["ANA"]);

    session.switch_tenant(Tenant::new("t2", "Gabinete Norte"));
    assert!(eventually(WAIT, || voters.data().len() == 2));
    assert!(voters.data().iter().all(|v| v.empresa_uid == "t2"));
    assert_eq!(backend.open_channel_count(), 1);

    // Only the new tenant's events arrive now.
    insert_voter(&backend, "t1", "DANIEL")?;
    insert_voter(&backend, "t2", "ELISA")?;
    assert!(eventually(WAIT, || voters.data().len() == 3));
    assert!(voters.data().iter().all(|v| v.empresa_uid == "t2"));
    assert_eq!(backend.open_channel_count(), 1);
    Ok(())
}

#[test]
fn logout_closes_channels_and_empties_collections() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    insert_voter(&backend, "t1", "ANA")?;
    let voters = session.voters(VoterFilters::default());
    let categories = session.categories(CategoryFilters::default());
    assert_eq!(backend.open_channel_count(), 2);
    assert_eq!(voters.data().len(), 1);

    session.logout();
    assert!(eventually(WAIT, || backend.open_channel_count() == 0));
    assert!(eventually(WAIT, || voters.phase() == SyncPhase::Uninitialized));
    assert!(eventually(WAIT, || categories.phase() == SyncPhase::Uninitialized));
    assert!(voters.data().is_empty());

    // Events for the old tenant no longer reach anyone.
    let selects = backend.select_count();
    insert_voter(&backend, "t1", "BIA")?;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(backend.select_count(), selects);
    Ok(())
}

#[test]
fn unmount_releases_the_channel_before_returning() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let mut voters = session.voters(VoterFilters::default());
    let categories = session.categories(CategoryFilters::default());
    assert_eq!(backend.open_channel_count(), 2);

    voters.unmount();
    assert_eq!(backend.open_channel_count(), 1);
    assert_eq!(voters.phase(), SyncPhase::Unsubscribed);

    // Terminal: a later tenant change does not revive it.
    session.switch_tenant(Tenant::new("t2", "Outro"));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(voters.phase(), SyncPhase::Unsubscribed);

    drop(categories);
    assert_eq!(backend.open_channel_count(), 0);
    Ok(())
}

#[test]
fn refetch_failure_while_offline_keeps_previous_rows() -> anyhow::Result<()> {
    init_logging();
    let database = Arc::new(SqliteBackend::open_memory()?);
    let backend = InstrumentedBackend::new(database.clone());
    let session = Session::builder()
        .backend(Arc::new(backend.clone()))
        .config(SyncConfig {
            feed_poll_interval_ms: 10,
            ..SyncConfig::default()
        })
        .login(UserProfile {
            uid: "u1".to_string(),
            nome: "Operador".to_string(),
            email: "operador@gabinete.org".to_string(),
            empresa: Some(Tenant::new("t1", "Gabinete")),
        })?;
    let ana = insert_voter(&*database, "t1", "ANA")?;
    let voters = session.voters(VoterFilters::default());
    assert_eq!(names(&voters), vec!["ANA"]);

    // Another client writes while this one cannot read.
    backend.set_offline(true);
    let selects = backend.select_count();
    rename_voter(&*database, &ana, "ANA MARIA")?;

    assert!(eventually(WAIT, || backend.select_count() > selects));
    assert!(eventually(WAIT, || !voters.is_loading()));
    assert_eq!(names(&voters), vec!["ANA"]);
    assert!(voters.error().is_none());
    assert!(eventually(WAIT, || voters.phase() == SyncPhase::SubscribedIdle));

    // The next event after reconnecting catches up.
    backend.set_offline(false);
    insert_voter(&*database, "t1", "BIA")?;
    assert!(eventually(WAIT, || voters.data().len() == 2));
    assert!(names(&voters).contains(&"ANA MARIA".to_string()));

    // A foreground refetch does surface the failure.
    backend.set_offline(true);
    assert!(voters.refetch().is_err());
    assert!(voters.error().is_some());
    assert_eq!(voters.data().len(), 2);
    backend.set_offline(false);
    Ok(())
}

#[test]
fn collection_mutations_update_data_immediately() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let voters = session.voters(VoterFilters::default());
    assert!(voters.data().is_empty());

    let ana = voters.create(VoterDraft::new("Ana"))?;
    assert_eq!(names(&voters), vec!["ANA"]);
    assert_eq!(voters.phase(), SyncPhase::SubscribedIdle);

    voters.update(
        &ana.uid,
        VoterPatch {
            nome: Some("Ana Paula".to_string()),
            ..VoterPatch::default()
        },
    )?;
    assert_eq!(names(&voters), vec!["ANA PAULA"]);

    voters.delete(&ana.uid)?;
    assert!(voters.data().is_empty());
    assert!(eventually(WAIT, || voters.phase() == SyncPhase::SubscribedIdle));

    let err = voters.delete(&ana.uid).unwrap_err();
    assert_eq!(err, gbp_sync::SyncError::not_found("voters", &ana.uid));
    assert_eq!(backend.open_channel_count(), 1);
    Ok(())
}

#[test]
fn voter_scoped_attendances_follow_only_that_voter() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let store = session.store::<Voters>(VoterFilters::default());
    let ana = store.create(VoterDraft::new("Ana"))?;
    let bia = store.create(VoterDraft::new("Bia"))?;

    let history = session.attendances(AttendanceFilters::for_voter(&ana.uid));
    assert!(history.data().is_empty());
    let others = session.store::<Attendances>(AttendanceFilters::default());

    let selects = backend.select_count();
    others.create(AttendanceDraft {
        eleitor_uid: bia.uid.clone(),
        descricao: "Pedido de poda".to_string(),
        ..AttendanceDraft::default()
    })?;
    let after_bia = backend.select_count();
    thread::sleep(Duration::from_millis(150));
    // The create itself reads; the feed does not.
    assert_eq!(backend.select_count(), after_bia);
    assert!(after_bia > selects);
    assert!(history.data().is_empty());

    others.create(AttendanceDraft {
        eleitor_uid: ana.uid.clone(),
        descricao: "Consulta médica".to_string(),
        ..AttendanceDraft::default()
    })?;
    assert!(eventually(WAIT, || history.data().len() == 1));
    assert_eq!(history.data()[0].eleitor_uid, ana.uid);
    Ok(())
}

#[test]
fn collection_without_tenant_waits_for_one() -> anyhow::Result<()> {
    let (backend, session) = setup(None)?;
    let categories = session.categories(CategoryFilters::default());
    assert_eq!(categories.phase(), SyncPhase::Uninitialized);
    assert_eq!(backend.open_channel_count(), 0);
    assert_eq!(backend.select_count(), 0);

    session.switch_tenant(Tenant::new("t1", "Gabinete"));
    assert!(eventually(WAIT, || backend.open_channel_count() == 1));
    assert!(eventually(WAIT, || categories.phase() == SyncPhase::SubscribedIdle));

    let tipo = session
        .store::<CategoryTypes>(CategoryTypeFilters::default())
        .create(CategoryTypeDraft {
            nome: "Educação".to_string(),
        })?;
    categories.create(CategoryDraft {
        nome: "Creches".to_string(),
        tipo_uid: tipo.uid,
    })?;
    assert_eq!(categories.data().len(), 1);
    Ok(())
}

#[test]
fn previous_tenant_rows_disappear_at_once() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    insert_voter(&backend, "t1", "ANA")?;
    let voters = session.voters(VoterFilters::default());
    assert_eq!(names(&voters), vec!["ANA"]);

    session.switch_tenant(Tenant::new("t2", "Outro"));
    assert!(voters.data().is_empty(), "rows of t1 visible under t2: {:?}", names(&voters));

    session.switch_tenant(Tenant::new("t1", "Gabinete"));
    assert!(eventually(WAIT, || names(&voters) == vec!["ANA"]));

    session.logout();
    assert!(voters.data().is_empty());
    assert!(voters.state().data.is_empty());
    Ok(())
}

#[test]
fn events_queued_while_off_are_not_replayed() -> anyhow::Result<()> {
    let (backend, session) = setup(Some(Tenant::new("t1", "Gabinete")))?;
    let voters = session.voters(VoterFilters::default());

    backend.set_latency(Duration::from_millis(300), Duration::ZERO);
    let selects = backend.select_count();
    insert_voter(&backend, "t1", "ANA")?;
    // The worker is now inside the slow refetch for the first insert.
    assert!(eventually(WAIT, || backend.select_count() == selects + 1));

    voters.set_realtime(false);
    insert_voter(&backend, "t1", "BIA")?;
    voters.set_realtime(true);

    assert!(eventually(WAIT, || voters.phase() == SyncPhase::SubscribedIdle && !voters.is_loading()));
    thread::sleep(Duration::from_millis(400));
    assert_eq!(backend.select_count(), selects + 1);

    backend.set_latency(Duration::ZERO, Duration::ZERO);
    insert_voter(&backend, "t1", "CARLA")?;
    assert!(eventually(WAIT, || voters.data().len() == 3));
    Ok(())
}
