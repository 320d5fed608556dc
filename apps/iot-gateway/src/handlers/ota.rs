//! OTA 任务 handlers
//!
//! - POST /api/iot/ota/tasks - 创建任务（`all` 取固件产品下全部设备，`select` 取指定设备）
//! - GET /api/iot/ota/tasks/{tid} - 任务详情
//! - POST /api/iot/ota/tasks/{tid}/cancel - 取消（仅 `wait` 状态）
//! - GET /api/iot/ota/tasks/{tid}/records - 升级记录
//! - POST /api/iot/ota/tasks/{tid}/push - 向 `wait` 记录推送升级指令

use crate::AppState;
use crate::utils::normalize_required;
use crate::utils::response::{
    bad_request_error, ota_error, ota_record_to_dto, ota_task_to_dto, pipeline_error,
};
use api_contract::{ApiResponse, CreateOtaTaskRequest, OtaPushResultDto, OtaTaskRecordDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use iot_ota::CreateOtaTask;
use iot_storage::OtaDeviceScope;

#[derive(serde::Deserialize)]
pub struct TaskPath {
    task_id: String,
}

/// 创建 OTA 任务
pub async fn create_ota_task(
    State(state): State<AppState>,
    Json(req): Json<CreateOtaTaskRequest>,
) -> Response {
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let firmware_id = match normalize_required(req.firmware_id, "firmwareId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let Some(device_scope) = OtaDeviceScope::parse(req.device_scope.trim()) else {
        return bad_request_error(format!("unknown deviceScope: {}", req.device_scope));
    };
    let request = CreateOtaTask {
        name,
        firmware_id,
        device_scope,
        device_ids: req.device_ids,
    };
    match state.messages.ota().create(request).await {
        Ok(task) => (
            StatusCode::OK,
            Json(ApiResponse::success(ota_task_to_dto(task))),
        )
            .into_response(),
        Err(err) => ota_error(err),
    }
}

/// 任务详情
pub async fn get_ota_task(State(state): State<AppState>, Path(path): Path<TaskPath>) -> Response {
    match state.messages.ota().get_task(&path.task_id).await {
        Ok(task) => (
            StatusCode::OK,
            Json(ApiResponse::success(ota_task_to_dto(task))),
        )
            .into_response(),
        Err(err) => ota_error(err),
    }
}

/// 取消任务，未终结的记录同时标记失败
pub async fn cancel_ota_task(
    State(state): State<AppState>,
    Path(path): Path<TaskPath>,
) -> Response {
    match state.messages.ota().cancel(&path.task_id).await {
        Ok(task) => (
            StatusCode::OK,
            Json(ApiResponse::success(ota_task_to_dto(task))),
        )
            .into_response(),
        Err(err) => ota_error(err),
    }
}

/// 升级记录
pub async fn list_ota_task_records(
    State(state): State<AppState>,
    Path(path): Path<TaskPath>,
) -> Response {
    match state.messages.ota().list_records(&path.task_id).await {
        Ok(items) => {
            let data: Vec<OtaTaskRecordDto> = items.into_iter().map(ota_record_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => ota_error(err),
    }
}

/// 推送升级指令，返回实际下发条数
pub async fn push_ota_task(State(state): State<AppState>, Path(path): Path<TaskPath>) -> Response {
    match state.messages.push_ota_task(&path.task_id).await {
        Ok(sent) => (
            StatusCode::OK,
            Json(ApiResponse::success(OtaPushResultDto {
                task_id: path.task_id,
                sent,
            })),
        )
            .into_response(),
        Err(err) => pipeline_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{SERVER_ID, body_json, device, gateway_with};
    use crate::wiring::Stores;
    use iot_storage::OtaFirmwareRecord;
    use serde_json::Value;

    async fn seed_firmware(stores: &Stores) {
        stores
            .firmwares
            .create_firmware(OtaFirmwareRecord {
                firmware_id: "fw-2".to_string(),
                tenant_id: "tenant-1".to_string(),
                product_key: "prodX".to_string(),
                version: "2.0.0".to_string(),
                file_url: "https://files.example.com/fw-2.bin".to_string(),
                file_size: 2048,
                file_digest_algorithm: "SHA256".to_string(),
                file_digest_value: "ff00".to_string(),
            })
            .await
            .expect("firmware");
    }

    fn create_request(scope: &str, device_ids: &[&str]) -> CreateOtaTaskRequest {
        CreateOtaTaskRequest {
            name: " rollout ".to_string(),
            firmware_id: "fw-2".to_string(),
            device_scope: scope.to_string(),
            device_ids: device_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn task_path(task_id: &str) -> Path<TaskPath> {
        Path(TaskPath {
            task_id: task_id.to_string(),
        })
    }

    async fn create_task(state: &AppState, scope: &str, device_ids: &[&str]) -> Value {
        let response =
            create_ota_task(State(state.clone()), Json(create_request(scope, device_ids))).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn create_with_all_scope_targets_product_devices() {
        let (state, stores) = gateway_with(
            vec![device("dev-1", "devA"), device("dev-2", "devB")],
            10,
        );
        seed_firmware(&stores).await;
        let body = create_task(&state, "all", &[]).await;
        assert_eq!(body["data"]["name"], "rollout");
        assert_eq!(body["data"]["status"], "wait");
        assert_eq!(body["data"]["deviceScope"], "all");
        assert_eq!(body["data"]["totalCount"], 2);

        let task_id = body["data"]["taskId"].as_str().expect("task id").to_string();
        let body = body_json(list_ota_task_records(State(state), task_path(&task_id)).await).await;
        let records = body["data"].as_array().expect("records");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record["status"] == "wait"));
    }

    #[tokio::test]
    async fn create_rejects_bad_scope_and_unknown_firmware() {
        let (state, _) = gateway_with(vec![device("dev-1", "devA")], 10);
        let response = create_ota_task(
            State(state.clone()),
            Json(create_request("some", &["dev-1"])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            create_ota_task(State(state), Json(create_request("select", &["dev-1"]))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_only_from_wait() {
        let (state, stores) = gateway_with(vec![device("dev-1", "devA")], 10);
        seed_firmware(&stores).await;
        let body = create_task(&state, "select", &["dev-1"]).await;
        let task_id = body["data"]["taskId"].as_str().expect("task id").to_string();

        let response = cancel_ota_task(State(state.clone()), task_path(&task_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["status"], "cancel");

        let body =
            body_json(list_ota_task_records(State(state.clone()), task_path(&task_id)).await).await;
        assert_eq!(body["data"][0]["status"], "failed");
        assert_eq!(body["data"][0]["description"], "task canceled");

        let response = cancel_ota_task(State(state), task_path(&task_id)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await["error"]["code"],
            "OTA.STATUS_NOT_ALLOW_CANCEL"
        );
    }

    #[tokio::test]
    async fn push_sends_to_bound_devices() {
        let (state, stores) = gateway_with(vec![device("dev-1", "devA")], 10);
        seed_firmware(&stores).await;
        let body = create_task(&state, "select", &["dev-1"]).await;
        let task_id = body["data"]["taskId"].as_str().expect("task id").to_string();

        stores
            .directory
            .bind("dev-1", SERVER_ID, "s-1")
            .await
            .expect("bind");
        let response = push_ota_task(State(state.clone()), task_path(&task_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["sent"], 1);

        let response = get_ota_task(State(state), task_path("missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
