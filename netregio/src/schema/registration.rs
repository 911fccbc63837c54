use serde::{Deserialize, Serialize};

/// The validated field set staged in the cache between `create` and
/// `confirm`. Doubles as the `create` request body.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmailReq {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Created,
    Confirmed,
    AlreadyConfirmed,
    RolledBack,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistrationStatusResp {
    pub status: RegistrationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let resp = RegistrationStatusResp {
            status: RegistrationStatus::AlreadyConfirmed,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"status":"already_confirmed"}"#
        );
        let resp = RegistrationStatusResp {
            status: RegistrationStatus::RolledBack,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"status":"rolled_back"}"#
        );
    }

    #[test]
    fn test_pending_defaults() {
        let staged: PendingRegistration =
            serde_json::from_str(r#"{"email":"a@b.org"}"#).unwrap();
        assert!(staged.is_active);
        assert!(!staged.is_staff);
    }
}
