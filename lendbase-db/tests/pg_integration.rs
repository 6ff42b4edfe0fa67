//! End-to-end checks against a running PostgreSQL instance.
//!
//! Gated behind the `db-tests` feature; configure the target database
//! through the `LENDBASE_DB_*` environment variables and run with
//! `cargo test --features db-tests`.

#![cfg(feature = "db-tests")]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lendbase_cache::MemoryCache;
use lendbase_core::{Meta, Predicate, StoreError, UNSET_ID};
use lendbase_db::entities::{LoanBaseInfo, LoanBaseInfoPatch};
use lendbase_db::{DbConfig, PgBackend, Repository};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS loan_base_info (
        id BIGSERIAL PRIMARY KEY,
        applicant_name TEXT NOT NULL,
        id_card_no TEXT NOT NULL,
        phone TEXT NOT NULL,
        loan_amount_cents BIGINT NOT NULL,
        status INT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ
    )
";

async fn repo() -> Repository<LoanBaseInfo, PgBackend<LoanBaseInfo>> {
    let pool = DbConfig::from_env().create_pool().unwrap();
    let conn = pool.get().await.unwrap();
    conn.batch_execute(SCHEMA).await.unwrap();
    Repository::new(Arc::new(PgBackend::new(pool))).with_cache(Arc::new(MemoryCache::new()))
}

fn sample(tag: &str) -> LoanBaseInfo {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    LoanBaseInfo {
        meta: Meta::unsaved(chrono::Utc::now()),
        applicant_name: format!("applicant-{tag}-{nonce}"),
        id_card_no: format!("{nonce}"),
        phone: "13800000000".to_string(),
        loan_amount_cents: 2_500_000,
        status: 1,
    }
}

#[tokio::test]
async fn test_crud_roundtrip_over_postgres() {
    let repo = repo().await;

    let mut entity = sample("crud");
    repo.create(&mut entity).await.unwrap();
    assert_ne!(entity.id(), UNSET_ID);

    let read = repo.get_by_id(entity.id()).await.unwrap();
    assert_eq!(read.applicant_name, entity.applicant_name);

    let patch = LoanBaseInfoPatch {
        status: Some(3),
        ..Default::default()
    }
    .into_patch();
    assert_eq!(repo.update_by_id(entity.id(), &patch).await.unwrap(), 1);
    assert_eq!(repo.get_by_id(entity.id()).await.unwrap().status, 3);

    assert_eq!(repo.delete_by_id(entity.id()).await.unwrap(), 1);
    assert_eq!(
        repo.get_by_id(entity.id()).await,
        Err(StoreError::NotFound)
    );
}

#[tokio::test]
async fn test_predicate_query_over_postgres() {
    let repo = repo().await;

    let mut entity = sample("pred");
    repo.create(&mut entity).await.unwrap();

    let pred = Predicate::new().and_eq("applicant_name", entity.applicant_name.clone());
    let page = repo.get_by_predicate(&pred).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].id(), entity.id());

    repo.delete_by_id(entity.id()).await.unwrap();
    let gone = repo.get_by_predicate(&pred).await.unwrap();
    assert_eq!(gone.total, 0);
}

#[tokio::test]
async fn test_rolled_back_transaction_leaves_no_row() {
    let pool = DbConfig::from_env().create_pool().unwrap();
    let backend = Arc::new(PgBackend::<LoanBaseInfo>::new(pool));
    let repo: Repository<LoanBaseInfo, _> =
        Repository::new(backend.clone()).with_cache(Arc::new(MemoryCache::new()));

    let mut conn = backend.client().await.unwrap();
    conn.batch_execute(SCHEMA).await.unwrap();

    let tx = conn.transaction().await.unwrap();
    let mut entity = sample("tx");
    repo.create_within(&tx, &mut entity).await.unwrap();
    let id = entity.id();
    assert_ne!(id, UNSET_ID);
    tx.rollback().await.unwrap();

    assert_eq!(repo.get_by_id(id).await, Err(StoreError::NotFound));
}
