use domain::DeviceState;
use iot_auth::{
    AuthError, DeviceAuthService, DeviceLookup, build_auth_content, build_password,
    lookup_cache_key, validate_password,
};
use iot_storage::{DeviceRecord, DeviceStore, InMemoryDeviceStore, InMemoryKvCache, KvCache};
use std::sync::Arc;

fn device(device_id: &str, device_name: &str, secret: &str) -> DeviceRecord {
    DeviceRecord {
        device_id: device_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        product_key: "prodX".to_string(),
        device_name: device_name.to_string(),
        device_secret: secret.to_string(),
        state: DeviceState::Inactive,
        firmware_id: None,
    }
}

fn service(devices: Arc<InMemoryDeviceStore>, cache: Arc<InMemoryKvCache>) -> DeviceAuthService {
    DeviceAuthService::new(Arc::new(DeviceLookup::new(devices, cache, 3600)))
}

fn password_for(secret: &str, device_name: &str) -> String {
    build_password(secret, &build_auth_content(device_name, "prodX")).expect("sign")
}

#[tokio::test]
async fn auth_device_accepts_derived_password() {
    let devices = Arc::new(InMemoryDeviceStore::with_devices(vec![device("dev-1", "devA", "s3cr3t")]));
    let cache = Arc::new(InMemoryKvCache::new());
    let service = service(devices, cache.clone());

    let authed = service
        .auth_device("prodX&devA", &password_for("s3cr3t", "devA"))
        .await
        .expect("auth");
    assert_eq!(authed.device_id, "dev-1");

    let cached = cache
        .get(&lookup_cache_key("prodX", "devA"))
        .await
        .expect("cache");
    assert!(cached.is_some());
}

#[tokio::test]
async fn auth_device_rejects_wrong_password() {
    let devices = Arc::new(InMemoryDeviceStore::with_devices(vec![device("dev-1", "devA", "s3cr3t")]));
    let service = service(devices, Arc::new(InMemoryKvCache::new()));

    let result = service
        .auth_device("prodX&devA", &password_for("other", "devA"))
        .await;
    assert!(matches!(result, Err(AuthError::InvalidPassword)));
}

#[tokio::test]
async fn auth_device_rejects_malformed_username() {
    let service = service(
        Arc::new(InMemoryDeviceStore::new()),
        Arc::new(InMemoryKvCache::new()),
    );

    let result = service.auth_device("prodX-devA", "whatever").await;
    assert!(matches!(result, Err(AuthError::InvalidUsernameFormat(_))));
}

#[tokio::test]
async fn unknown_device_is_not_negatively_cached() {
    let devices = Arc::new(InMemoryDeviceStore::new());
    let cache = Arc::new(InMemoryKvCache::new());
    let service = service(devices.clone(), cache.clone());
    let password = password_for("s3cr3t", "devB");

    let first = service.auth_device("prodX&devB", &password).await;
    assert!(matches!(first, Err(AuthError::DeviceNotFound { .. })));
    assert!(cache
        .get(&lookup_cache_key("prodX", "devB"))
        .await
        .expect("cache")
        .is_none());

    devices
        .create_device(device("dev-2", "devB", "s3cr3t"))
        .await
        .expect("create");

    let second = service.auth_device("prodX&devB", &password).await;
    assert!(second.is_ok());
}

#[test]
fn validate_password_is_deterministic_and_secret_sensitive() {
    let password = password_for("s3cr3t", "devA");
    assert!(validate_password("s3cr3t", "devA", "prodX", &password));
    assert!(validate_password("s3cr3t", "devA", "prodX", &password));
    assert!(!validate_password("s3cr3u", "devA", "prodX", &password));
    assert!(!validate_password("s3cr3t", "devA", "prodY", &password));
}
