use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::users::services::ProfileUpdate;

/// Request body for `PUT /users/:id`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Left untyped; only parsed when the requester is an admin.
    pub role: Option<Value>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn raw_role(v: Option<Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) => non_blank(Some(s)),
        other => Some(other.to_string()),
    }
}

impl From<UpdateUserRequest> for ProfileUpdate {
    /// Blank strings count as absent.
    fn from(req: UpdateUserRequest) -> Self {
        ProfileUpdate {
            name: non_blank(req.name),
            email: non_blank(req.email),
            role: raw_role(req.role),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub msg: &'static str,
}
