// std
use std::time::Duration as StdDuration;
// crates.io
use time::{Duration, OffsetDateTime, macros::datetime};
// self
use crm_auth_broker::{
	auth::{CompanyId, SessionIdentity, TenantId, TokenRecord, TokenStatus, UserId},
	store::{MemoryStore, TokenStore},
};

fn tenant(id: &str) -> TenantId {
	TenantId::new(id).expect("Failed to build tenant identifier for memory store tests.")
}

fn build_record(tenant: &TenantId, access: &str, refresh: Option<&str>) -> TokenRecord {
	let identity = SessionIdentity::new(tenant.clone())
		.with_user(UserId::new("user-1").expect("User fixture should be valid."))
		.with_company(CompanyId::new("company-1").expect("Company fixture should be valid."));
	let mut builder = TokenRecord::builder(identity)
		.access_token(access)
		.issued_at(datetime!(2025-11-10 12:00 UTC))
		.expires_in(Duration::hours(1));

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	builder.build().expect("Token record fixture should build successfully.")
}

#[tokio::test]
async fn put_get_and_last_write_wins() {
	let store = MemoryStore::default();
	let tenant = tenant("loc-1");

	store
		.put(build_record(&tenant, "access-1", Some("refresh-1")))
		.await
		.expect("Saving the first record should succeed.");
	store
		.put(build_record(&tenant, "access-2", None))
		.await
		.expect("Saving the second record should succeed.");

	let fetched = store
		.get(&tenant)
		.await
		.expect("Fetching from the memory store should succeed.")
		.expect("Stored record should remain present.");

	assert_eq!(store.len(), 1);
	assert_eq!(fetched.access_token.expose(), "access-2");
	assert!(fetched.refresh_token.is_none());
	assert_eq!(fetched.identity.user_id.as_deref(), Some("user-1"));
	assert_eq!(fetched.status_at(datetime!(2025-11-10 12:30 UTC)), TokenStatus::Active);
	assert!(store.get(&self::tenant("loc-2")).await.expect("Fetch should succeed.").is_none());
}

#[tokio::test]
async fn clear_removes_the_record_and_its_identifiers() {
	let store = MemoryStore::default();
	let tenant = tenant("loc-clear");

	store
		.put(build_record(&tenant, "access", Some("refresh")))
		.await
		.expect("Saving the record should succeed.");
	store.clear(&tenant).await.expect("Clearing should succeed.");

	assert!(store.get(&tenant).await.expect("Fetch should succeed.").is_none());
	assert!(store.is_empty());

	store.clear(&tenant).await.expect("Clearing an absent tenant should be a no-op.");
}

#[tokio::test]
async fn capacity_evicts_the_oldest_session() {
	let store = MemoryStore::with_capacity(2);
	let tenants = ["loc-a", "loc-b", "loc-c"].map(tenant);

	for tenant in &tenants {
		store
			.put(build_record(tenant, "access", Some("refresh")))
			.await
			.expect("Saving the record should succeed.");
		tokio::time::sleep(StdDuration::from_millis(2)).await;
	}

	assert_eq!(store.len(), 2);
	assert!(store.get(&tenants[0]).await.expect("Fetch should succeed.").is_none());
	assert!(store.get(&tenants[1]).await.expect("Fetch should succeed.").is_some());
	assert!(store.get(&tenants[2]).await.expect("Fetch should succeed.").is_some());

	store
		.put(build_record(&tenants[2], "access-updated", None))
		.await
		.expect("Updating an existing tenant should not evict.");

	assert_eq!(store.len(), 2);
	assert!(store.get(&tenants[1]).await.expect("Fetch should succeed.").is_some());
}

#[tokio::test]
async fn expired_sessions_are_dropped_on_access() {
	let store = MemoryStore::default().with_session_ttl(Duration::ZERO);
	let tenant = tenant("loc-expired");

	store
		.put(build_record(&tenant, "access", Some("refresh")))
		.await
		.expect("Saving the record should succeed.");

	assert_eq!(store.len(), 1);
	assert!(store.get(&tenant).await.expect("Fetch should succeed.").is_none());
	assert!(store.is_empty());

	let live = MemoryStore::default();

	live.put(build_record(&tenant, "access", None)).await.expect("Saving should succeed.");

	let record =
		live.get(&tenant).await.expect("Fetch should succeed.").expect("Record should be live.");

	assert!(record.is_stale_at(OffsetDateTime::now_utc(), Duration::seconds(60)));
}
