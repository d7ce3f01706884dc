//! Driver lifecycle: one-shot init, DSN open, database creation with a
//! locally derived id, confirmation waits and the end-to-end query
//! scenario against mock block producers and miners.
//!
//! Tests here touch the process-wide driver singleton and therefore
//! serialize on `support::driver_lock` and reset the driver up front.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use dsql_client::{
    create, drop_database, init, is_initialized, local_account, open, reset, update_permission,
    wait_database_creation, wait_tx_confirmation, with_transaction, Config, Error,
};
use dsql_common::crypto::sha3_512;
use dsql_common::Hash;
use dsql_proto::ids::{derive_database_id, looks_like_derived_id, AccountNonce};
use dsql_proto::meta::{Permission, PermissionRole, ResourceMeta};
use dsql_proto::rpc::Value;
use dsql_proto::tx::TxState;

use support::{
    driver_lock, miner_info, spawn_chain, spawn_miner, write_client_fixture, MockChain, MockMiner,
};

/// Initialize the driver against a fresh mock chain; returns the chain
/// and the tempdir keeping the fixture alive.
async fn init_against_mock() -> (std::sync::Arc<MockChain>, tempfile::TempDir) {
    let chain = MockChain::new();
    let url = spawn_chain(chain.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let (config_path, _kp) = write_client_fixture(dir.path(), &[url]);
    init(&config_path, b"").await.expect("init");
    (chain, dir)
}

#[tokio::test]
async fn lifecycle_operations_require_init() {
    let _guard = driver_lock();
    reset();
    // point default-config probing at a location that cannot resolve
    let home = tempfile::tempdir().expect("tempdir");
    std::env::set_var("HOME", home.path());

    assert!(matches!(
        create(ResourceMeta::default()).await,
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        open("dsql://db").await,
        Err(Error::NotInitialized)
    ));
    assert!(matches!(drop_database("dsql://db"), Err(Error::NotInitialized)));
    assert!(matches!(
        wait_tx_confirmation(sha3_512(b"tx"), Duration::from_secs(1)).await,
        Err(Error::NotInitialized)
    ));

    // a bad DSN still fails fast, before any init attempt
    assert!(matches!(
        open("invalid dsn").await,
        Err(Error::InvalidDsn(_))
    ));
}

#[tokio::test]
async fn init_is_one_shot_and_create_derives_the_id() {
    let _guard = driver_lock();
    reset();
    let (chain, _dir) = init_against_mock().await;

    assert!(is_initialized());
    assert_eq!(chain.pings.load(Ordering::SeqCst), 1, "node announced once");

    // second init must not alter state
    let other = tempfile::tempdir().expect("tempdir");
    let (other_config, _) = write_client_fixture(other.path(), &["http://127.0.0.1:1".into()]);
    assert!(matches!(
        init(&other_config, b"").await,
        Err(Error::AlreadyInitialized)
    ));
    assert!(is_initialized());

    let (tx_hash, dsn) = create(ResourceMeta { node: 3, ..Default::default() })
        .await
        .expect("create");
    assert_ne!(tx_hash, Hash::zero());
    assert_eq!(
        *chain.accepted_txs.lock(),
        vec![tx_hash.to_hex()],
        "signed create tx reached the producers"
    );

    // the dsn embeds the id derived from (account, first allocated nonce)
    let cfg = Config::parse(&dsn).expect("parse returned dsn");
    assert!(looks_like_derived_id(&cfg.database_id));
    let expected = derive_database_id(&local_account().expect("account"), AccountNonce(1));
    assert_eq!(cfg.database_id, expected.as_str());

    // a follow-up permission grant consumes the next nonce
    let granted = update_permission(
        local_account().expect("account"),
        &expected,
        Permission::new(PermissionRole::Write),
    )
    .await
    .expect("update permission");
    assert_eq!(chain.accepted_txs.lock().len(), 2);
    assert_ne!(granted, tx_hash);

    reset();
}

#[tokio::test]
async fn wait_tx_confirmation_reports_first_poll_state() {
    let _guard = driver_lock();
    reset();
    let (chain, _dir) = init_against_mock().await;
    chain.set_tx_states(vec![TxState::Confirmed]);

    let state = wait_tx_confirmation(sha3_512(b"tx"), Duration::from_secs(5))
        .await
        .expect("wait");
    assert_eq!(state, TxState::Confirmed);

    reset();
}

#[tokio::test]
async fn drop_database_is_local_eviction_only() {
    let _guard = driver_lock();
    reset();
    let (_chain, _dir) = init_against_mock().await;

    assert!(matches!(drop_database("invalid dsn"), Err(Error::InvalidDsn(_))));

    let hash = drop_database("dsql://db").expect("drop");
    assert_eq!(hash, Hash::zero(), "no on-chain drop transaction is produced");

    reset();
}

#[tokio::test]
async fn wait_database_creation_probes_the_data_plane() {
    let _guard = driver_lock();
    reset();
    let (chain, _dir) = init_against_mock().await;

    let (_tx_hash, dsn) = create(ResourceMeta { node: 1, ..Default::default() })
        .await
        .expect("create");
    let cfg = Config::parse(&dsn).expect("parse");

    let miner = MockMiner::new();
    let miner_url = spawn_miner(miner.clone()).await;
    chain.install_profile(&cfg.database_id, 1, vec![miner_info("m0", &miner_url)]);
    // the first polls land before the creation "confirms"
    chain.profile_not_found_until.store(2, Ordering::SeqCst);

    wait_database_creation(&dsn, Duration::from_secs(5), Duration::from_millis(10))
        .await
        .expect("database becomes usable");

    assert!(
        chain.profile_queries.load(Ordering::SeqCst) >= 3,
        "not-found polls must be retried"
    );
    let probes = miner.query_requests.lock();
    assert!(
        probes
            .iter()
            .any(|req| req.queries[0].pattern.eq_ignore_ascii_case("show tables")),
        "data plane must be probed before declaring success"
    );

    reset();
}

#[tokio::test]
async fn scenario_create_open_write_read() {
    let _guard = driver_lock();
    reset();
    let (chain, _dir) = init_against_mock().await;

    let (_tx_hash, dsn) = create(ResourceMeta { node: 3, ..Default::default() })
        .await
        .expect("create");
    let cfg = Config::parse(&dsn).expect("parse");

    let miner = MockMiner::new();
    let miner_url = spawn_miner(miner.clone()).await;
    chain.install_profile(&cfg.database_id, 1, vec![miner_info("m0", &miner_url)]);

    let conn = open(&dsn).await.expect("open");
    conn.exec("CREATE TABLE test (test int)", vec![]).await.expect("create table");
    conn.exec("INSERT INTO test VALUES(1)", vec![]).await.expect("insert");

    let mut rows = conn
        .query("SELECT * FROM test LIMIT 1", vec![])
        .await
        .expect("select");
    assert_eq!(rows.columns(), &["test".to_string()]);
    assert_eq!(rows.column_type(0).as_deref(), Some("INT"));
    assert_eq!(rows.next_row(), Some(vec![Value::Integer(1)]));
    assert_eq!(rows.next_row(), None, "exactly one row");

    // receipts are populated out-of-band on request success
    let slot = dsql_client::ReceiptSlot::new();
    conn.exec_with_receipt("INSERT INTO test VALUES(2)", vec![], Some(&slot))
        .await
        .expect("insert with receipt");
    assert!(slot.take().is_some(), "receipt must carry the request hash");

    conn.close();
    assert!(matches!(
        conn.query("SELECT 1", vec![]).await,
        Err(Error::ConnClosed)
    ));

    reset();
}

#[tokio::test]
async fn transaction_envelope_commits_batches_and_rolls_back() {
    let _guard = driver_lock();
    reset();
    let (chain, _dir) = init_against_mock().await;

    let miner = MockMiner::new();
    let miner_url = spawn_miner(miner.clone()).await;
    chain.install_profile("txdb", 1, vec![miner_info("m0", &miner_url)]);

    let conn = open("dsql://txdb").await.expect("open");

    // reads are rejected while a transaction is open
    conn.begin().expect("begin");
    assert!(matches!(
        conn.query("SELECT * FROM test", vec![]).await,
        Err(Error::QueryInTransaction)
    ));
    assert!(matches!(conn.begin(), Err(Error::TransactionActive)));
    conn.rollback().expect("rollback");

    // committed writes arrive as one atomic batch
    with_transaction(&conn, |tx| async move {
        tx.exec("INSERT INTO test VALUES(?)", vec![Value::Integer(7)]).await?;
        tx.exec("INSERT INTO test VALUES(?)", vec![Value::Integer(8)]).await?;
        Ok(())
    })
    .await
    .expect("transaction");

    {
        let execs = miner.exec_requests.lock();
        assert_eq!(execs.len(), 1, "the batch travels as a single request");
        assert_eq!(execs[0].queries.len(), 2);
    }
    assert_eq!(miner.table.lock().len(), 2);

    // an error from the closure rolls back and propagates unchanged
    let err = with_transaction(&conn, |tx| async move {
        tx.exec("INSERT INTO test VALUES(?)", vec![Value::Integer(9)]).await?;
        Err::<(), _>(Error::Rpc("some error".into()))
    })
    .await
    .expect_err("must propagate");
    assert!(matches!(&err, Error::Rpc(msg) if msg == "some error"));

    // rollback law: the aborted write left no trace
    assert_eq!(miner.exec_requests.lock().len(), 1);
    assert_eq!(miner.table.lock().len(), 2);
    let mut rows = conn.query("SELECT * FROM test", vec![]).await.expect("select");
    assert_eq!(rows.by_ref().count(), 2);

    reset();
}
