//! 设备与 OTA 状态。

use serde::{Deserialize, Serialize};

/// 设备状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Inactive,
    Online,
    Offline,
}

impl DeviceState {
    pub fn code(self) -> i16 {
        match self {
            DeviceState::Inactive => 0,
            DeviceState::Online => 1,
            DeviceState::Offline => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(DeviceState::Inactive),
            1 => Some(DeviceState::Online),
            2 => Some(DeviceState::Offline),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Inactive => "inactive",
            DeviceState::Online => "online",
            DeviceState::Offline => "offline",
        }
    }
}

/// OTA 任务状态：`Wait → Done` 或 `Wait → Cancel`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaTaskStatus {
    Wait,
    Done,
    Cancel,
}

impl OtaTaskStatus {
    pub fn code(self) -> i16 {
        match self {
            OtaTaskStatus::Wait => 10,
            OtaTaskStatus::Done => 20,
            OtaTaskStatus::Cancel => 30,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            10 => Some(OtaTaskStatus::Wait),
            20 => Some(OtaTaskStatus::Done),
            30 => Some(OtaTaskStatus::Cancel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OtaTaskStatus::Wait => "wait",
            OtaTaskStatus::Done => "done",
            OtaTaskStatus::Cancel => "cancel",
        }
    }
}

/// OTA 升级记录状态：`Wait → Pushed → Upgrading → {Success | Failed}`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaRecordStatus {
    Wait,
    Pushed,
    Upgrading,
    Success,
    Failed,
}

impl OtaRecordStatus {
    pub fn code(self) -> i16 {
        match self {
            OtaRecordStatus::Wait => 0,
            OtaRecordStatus::Pushed => 10,
            OtaRecordStatus::Upgrading => 20,
            OtaRecordStatus::Success => 30,
            OtaRecordStatus::Failed => 40,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OtaRecordStatus::Wait),
            10 => Some(OtaRecordStatus::Pushed),
            20 => Some(OtaRecordStatus::Upgrading),
            30 => Some(OtaRecordStatus::Success),
            40 => Some(OtaRecordStatus::Failed),
            _ => None,
        }
    }

    /// 按名称解析（忽略大小写）。
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wait" => Some(OtaRecordStatus::Wait),
            "pushed" => Some(OtaRecordStatus::Pushed),
            "upgrading" => Some(OtaRecordStatus::Upgrading),
            "success" => Some(OtaRecordStatus::Success),
            "failed" => Some(OtaRecordStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OtaRecordStatus::Wait => "wait",
            OtaRecordStatus::Pushed => "pushed",
            OtaRecordStatus::Upgrading => "upgrading",
            OtaRecordStatus::Success => "success",
            OtaRecordStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OtaRecordStatus::Success | OtaRecordStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_status_parses_codes_and_names() {
        assert_eq!(OtaRecordStatus::from_code(20), Some(OtaRecordStatus::Upgrading));
        assert_eq!(OtaRecordStatus::from_code(5), None);
        assert_eq!(OtaRecordStatus::from_name("SUCCESS"), Some(OtaRecordStatus::Success));
        assert!(OtaRecordStatus::Failed.is_terminal());
        assert!(!OtaRecordStatus::Pushed.is_terminal());
    }

    #[test]
    fn task_status_codes() {
        for status in [OtaTaskStatus::Wait, OtaTaskStatus::Done, OtaTaskStatus::Cancel] {
            assert_eq!(OtaTaskStatus::from_code(status.code()), Some(status));
        }
    }
}
