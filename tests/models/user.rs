//! Test models.

use chrono::{DateTime, Utc};
use odm_rust::{HookError, Lifecycle, Model, ObjectId};

#[derive(Clone, Debug, PartialEq, Model)]
#[model(collection = "users")]
pub struct User {
    pub oid: Option<ObjectId>,
    pub email: String,
    pub password: String,
    pub nickname: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    #[model(skip)]
    pub saved: bool,
}

impl User {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            oid: None,
            email: email.to_string(),
            password: password.to_string(),
            nickname: None,
            updated_at: None,
            saved: false,
        }
    }
}

impl Lifecycle for User {
    fn will_save(&mut self) -> Result<(), HookError> {
        if self.email.is_empty() {
            return Err("email is required".into());
        }
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    fn did_save(&mut self) {
        self.saved = true;
    }
}

/// Same collection as [`User`], but with a profile field most stored users
/// do not have.
#[derive(Clone, Debug, Model)]
#[model(collection = "users")]
pub struct Profile {
    #[model(id)]
    pub key: ObjectId,
    pub email: String,
    pub age: i32,
}

impl Lifecycle for Profile {
    fn will_save(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn did_save(&mut self) {}
}
