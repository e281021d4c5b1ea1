//! Behavioral tests for the delegation store's dual-key indexing.

use creel_client::store::{DelegationStore, StoreError};
use creel_storage::{FileSystemStorageBackend, MemoryStorageBackend, StorageBackend};
use creel_ucan::{Command, Delegation, Did, Ed25519Signer, Subject, signer::Principal};
use futures_util::{TryStreamExt, pin_mut};
use ipld_core::ipld::Ipld;
use pretty_assertions::assert_eq;
use testresult::TestResult;

fn signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::from_seed(&[seed; 32])
}

fn delegation(
    issuer: &Ed25519Signer,
    audience: &Did,
    subject: Subject,
    command: &str,
) -> Delegation {
    Delegation::builder()
        .issuer(issuer.clone())
        .audience(audience.clone())
        .subject(subject)
        .command(Command::try_from(command).unwrap())
        .try_build()
        .unwrap()
}

fn memory_store() -> DelegationStore<MemoryStorageBackend<String, Vec<u8>>> {
    DelegationStore::new(MemoryStorageBackend::default())
}

#[tokio::test]
async fn put_makes_a_delegation_reachable_both_ways_and_del_removes_both() -> TestResult {
    let space = signer(1);
    let identity = signer(2);
    let mut store = memory_store();

    let dlg = delegation(
        &space,
        identity.did(),
        Subject::Specific(space.did().clone()),
        "/blob/add",
    );
    let link = store.put(&dlg).await?;

    assert_eq!(store.get(&link).await?, dlg);

    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert_eq!(found, vec![(link, dlg.clone())]);

    store.del(&link).await?;
    assert!(matches!(store.get(&link).await, Err(StoreError::NotFound)));
    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert!(found.is_empty());

    // A second delete reports the absence distinctly.
    assert!(matches!(store.del(&link).await, Err(StoreError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn powerline_delegations_match_any_subject_query() -> TestResult {
    let space = signer(3);
    let identity = signer(4);
    let mut store = memory_store();

    // Top authority, no subject restriction: the shape `space create`
    // would store for a brand-new space.
    let powerline = delegation(&space, identity.did(), Subject::Any, "/");
    store.put(&powerline).await?;

    // Queried for a descendant command with an explicit subject, the
    // powerline delegation must still surface: the caller never deals
    // in the index's null sentinel.
    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1, powerline);

    // And without a subject filter.
    let found: Vec<_> = store
        .find(identity.did(), &Command::try_from("/blob/add")?, None)
        .try_collect()
        .await?;
    assert_eq!(found.len(), 1);
    Ok(())
}

#[tokio::test]
async fn subject_scoped_queries_exclude_other_subjects() -> TestResult {
    let space_a = signer(5);
    let space_b = signer(6);
    let identity = signer(7);
    let mut store = memory_store();

    let for_a = delegation(
        &space_a,
        identity.did(),
        Subject::Specific(space_a.did().clone()),
        "/blob/add",
    );
    store.put(&for_a).await?;

    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space_b.did()),
        )
        .try_collect()
        .await?;
    assert!(found.is_empty());
    Ok(())
}

#[tokio::test]
async fn audiences_are_isolated_from_each_other() -> TestResult {
    let space = signer(8);
    let alice = signer(9);
    let bob = signer(10);
    let mut store = memory_store();

    store
        .put(&delegation(
            &space,
            alice.did(),
            Subject::Specific(space.did().clone()),
            "/blob/add",
        ))
        .await?;

    let for_bob: Vec<_> = store.list(bob.did()).try_collect().await?;
    assert!(for_bob.is_empty());

    let for_alice: Vec<_> = store.list(alice.did()).try_collect().await?;
    assert_eq!(for_alice.len(), 1);
    Ok(())
}

#[tokio::test]
async fn command_widening_does_not_cross_sibling_commands() -> TestResult {
    let space = signer(11);
    let identity = signer(12);
    let mut store = memory_store();

    store
        .put(&delegation(
            &space,
            identity.did(),
            Subject::Specific(space.did().clone()),
            "/blob/list",
        ))
        .await?;

    // A delegation for /blob/list grants neither /blob/add nor /blob.
    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert!(found.is_empty());

    // But a /blob delegation covers /blob/add.
    store
        .put(&delegation(
            &space,
            identity.did(),
            Subject::Specific(space.did().clone()),
            "/blob",
        ))
        .await?;
    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert_eq!(found.len(), 1);
    Ok(())
}

#[tokio::test]
async fn iteration_may_stop_after_the_first_match() -> TestResult {
    let space = signer(13);
    let identity = signer(14);
    let mut store = memory_store();

    for command in ["/blob/add", "/blob", "/"] {
        store
            .put(&delegation(
                &space,
                identity.did(),
                Subject::Specific(space.did().clone()),
                command,
            ))
            .await?;
    }

    let command = Command::try_from("/blob/add")?;
    {
        let stream = store.find(identity.did(), &command, Some(space.did()));
        pin_mut!(stream);
        let first = stream.try_next().await?;
        assert!(first.is_some());
        // Dropped here after one item.
    }

    // The store keeps working after an abandoned scan.
    let all: Vec<_> = store.list(identity.did()).try_collect().await?;
    assert_eq!(all.len(), 3);
    Ok(())
}

#[tokio::test]
async fn corrupt_records_surface_as_stream_errors() -> TestResult {
    let identity = signer(15);
    let mut backend = MemoryStorageBackend::<String, Vec<u8>>::default();
    backend
        .set(
            format!("{}/~blob~add/null/not-a-link", identity.did()),
            vec![0xde, 0xad, 0xbe, 0xef],
        )
        .await?;
    let store = DelegationStore::new(backend);

    let result: Result<Vec<_>, _> = store.list(identity.did()).try_collect().await;
    assert!(matches!(result, Err(StoreError::Codec(_))));
    Ok(())
}

#[tokio::test]
async fn repair_removes_index_entries_without_a_primary_record() -> TestResult {
    let space = signer(16);
    let identity = signer(17);

    // The memory backend shares state across clones, so we can reach
    // underneath the store to simulate a crash between the two writes.
    let backend = MemoryStorageBackend::<String, Vec<u8>>::default();
    let mut store = DelegationStore::new(backend.clone());

    let dlg = delegation(
        &space,
        identity.did(),
        Subject::Specific(space.did().clone()),
        "/blob/add",
    );
    let link = store.put(&dlg).await?;

    let mut backend = backend;
    assert!(backend.delete(&link.to_string()).await?);

    assert_eq!(store.repair().await?, 1);
    let found: Vec<_> = store.list(identity.did()).try_collect().await?;
    assert!(found.is_empty());

    // A healthy store repairs to zero.
    store.put(&dlg).await?;
    assert_eq!(store.repair().await?, 0);
    Ok(())
}

#[tokio::test]
async fn the_filesystem_backend_persists_across_reopens() -> TestResult {
    let tempdir = tempfile::tempdir()?;
    let space = signer(18);
    let identity = signer(19);

    let dlg = Delegation::builder()
        .issuer(space.clone())
        .audience(identity.did().clone())
        .subject(Subject::Any)
        .command(Command::top())
        .meta([("name".to_string(), Ipld::String("persistent".into()))].into())
        .try_build()?;

    let link = {
        let backend = FileSystemStorageBackend::new(tempdir.path()).await?;
        let mut store = DelegationStore::new(backend);
        store.put(&dlg).await?
    };

    let backend = FileSystemStorageBackend::new(tempdir.path()).await?;
    let store = DelegationStore::new(backend);
    assert_eq!(store.get(&link).await?, dlg);

    let found: Vec<_> = store
        .find(
            identity.did(),
            &Command::try_from("/blob/add")?,
            Some(space.did()),
        )
        .try_collect()
        .await?;
    assert_eq!(found.len(), 1);
    Ok(())
}
